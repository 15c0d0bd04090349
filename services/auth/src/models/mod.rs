//! Authentication service models

pub mod company;
pub mod role;
pub mod session;
pub mod token;
pub mod user;

pub use company::{Company, CompanyLookup, NewCompany};
pub use session::{ClientInfo, NewRefreshToken, RefreshToken};
pub use token::{InitialVerification, NewOneTimeToken, OneTimePurpose, OneTimeToken};
pub use user::{NewUser, User, UserRole, UserStatus};
