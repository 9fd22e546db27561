pub mod enums;

mod assessment;
mod dismissal;
mod integration;
mod safety_event;
mod session;
mod vitals;

pub use assessment::*;
pub use dismissal::*;
pub use integration::*;
pub use safety_event::*;
pub use session::*;
pub use vitals::*;

/// Clinic/site identifier as issued by the practice registry.
pub type SiteId = i64;
