pub mod client;
pub mod error;
pub mod grant;
pub mod upload;

pub use client::{ChatLogUploader, UploaderOptions};
pub use error::UploadError;
pub use grant::PresignedGrant;
pub use upload::UploadResult;
