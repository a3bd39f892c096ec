pub mod flash;
pub mod pages;
