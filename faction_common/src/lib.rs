mod money;

pub mod helpers;
mod secret;
mod shutdown;

pub use money::{Money, MoneyConversionError};
pub use secret::Secret;
pub use shutdown::{Shutdown, ShutdownSignal};
