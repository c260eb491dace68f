//! Terminal widgets shared by the front ends.

mod device_selector;
mod error;

pub use device_selector::{device_selector, selectable_devices};
pub use error::SurveyGuiError;
