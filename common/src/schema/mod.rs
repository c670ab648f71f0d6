mod login_attempt;
mod subscription;
mod transaction;
mod users;

pub use login_attempt::*;
pub use subscription::*;
pub use transaction::*;
pub use users::*;
