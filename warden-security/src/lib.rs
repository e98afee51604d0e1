pub mod error;
pub mod principal;
pub mod roles;

pub use error::SecurityError;
pub use principal::Principal;
pub use roles::{DefaultRoleExtractor, FirstOf, RealmRoleExtractor, RoleExtractor, StandardRoleExtractor};

pub mod prelude {
    //! Re-exports of the most commonly used security types.
    pub use crate::{Principal, RoleExtractor, SecurityError};
}
