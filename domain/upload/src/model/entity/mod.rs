mod upload_session;

pub use upload_session::*;
