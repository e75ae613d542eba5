mod session;
mod step;

pub use session::*;
pub use step::*;
