use std::{error::Error, fmt::Display, io};

use crossbeam::channel;

use crate::pei::PeiError;
use crate::radio::RadioError;

/// Failures of the terminal front end.
#[derive(Debug)]
pub enum SurveyGuiError {
    #[allow(missing_docs)]
    IOError(io::Error),
    /// The radio could not be opened.
    RadioError(RadioError),
    /// The other end of a channel is gone.
    ChannelSendError,
    #[allow(missing_docs)]
    ChannelRecvError(channel::RecvError),
    /// A worker thread panicked.
    JoinError,
    /// The user quit before choosing a device.
    NoDevice,
}

impl Display for SurveyGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurveyGuiError::IOError(err) => write!(f, "{}", err),
            SurveyGuiError::RadioError(err) => write!(f, "{}", err),
            SurveyGuiError::NoDevice => write!(f, "no device selected"),
            other => write!(f, "{:?}", other),
        }
    }
}

impl Error for SurveyGuiError {}

impl From<io::Error> for SurveyGuiError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<RadioError> for SurveyGuiError {
    fn from(value: RadioError) -> Self {
        Self::RadioError(value)
    }
}

impl From<PeiError> for SurveyGuiError {
    fn from(value: PeiError) -> Self {
        Self::RadioError(RadioError::Pei(value))
    }
}

impl<T> From<channel::SendError<T>> for SurveyGuiError {
    fn from(_: channel::SendError<T>) -> Self {
        Self::ChannelSendError
    }
}

impl From<channel::RecvError> for SurveyGuiError {
    fn from(value: channel::RecvError) -> Self {
        Self::ChannelRecvError(value)
    }
}
