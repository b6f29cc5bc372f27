pub mod avif;
pub mod gif;
pub mod jpeg;
pub mod webp;
