pub mod filesystem;
pub mod null;
pub mod s3;
