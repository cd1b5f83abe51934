pub mod errors;
pub mod events;
pub mod fields;
pub mod machine;
pub mod model;
