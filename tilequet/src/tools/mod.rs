pub mod convert;
pub mod inspect;
pub mod split_zoom;
pub mod validate;
