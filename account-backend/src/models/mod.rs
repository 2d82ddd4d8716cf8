pub mod post;
pub mod session;
pub mod user;

pub use post::{Post, UpdatePostRequest};
pub use session::Session;
pub use user::{NewUser, User, UserFilter, UserResponse, UserRole, UserStatus, UserUpdate};
