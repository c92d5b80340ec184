pub mod caller;

pub use caller::{decode_user, Caller, CallerUser};
