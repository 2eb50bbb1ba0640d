pub mod accessors;
pub mod health;
pub mod overrides;
pub mod pages;
pub mod tabs;
