pub mod controller;
pub mod state;
pub mod ticker;

pub use controller::{SessionController, SessionRequest, SessionSnapshot};
pub use state::{SessionState, SessionStatus};
pub use ticker::RepeatingTask;
