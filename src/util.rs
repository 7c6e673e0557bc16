pub mod bitmap;
pub mod collection;
pub mod dag;
pub mod datetime;
pub mod http;
pub mod id;
pub mod log;
pub mod safe_set;
pub mod sync;
