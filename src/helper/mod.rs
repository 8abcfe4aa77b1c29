pub mod admin_helpers;
pub mod comment_helpers;
pub mod feed_helpers;
pub mod form_helpers;
pub mod public_helpers;
pub mod sanitization_helpers;
