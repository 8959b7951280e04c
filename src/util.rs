pub mod fs;
pub mod hashing;
pub mod paths;
