pub mod phone;
pub use phone::{PhoneValidationError, validate_phone_number};
