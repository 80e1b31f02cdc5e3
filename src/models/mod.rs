mod session;

pub use session::{CountingMethod, KickSession, SessionOutcome, TARGET_KICKS};
