pub(crate) mod ambient;
pub(crate) mod mix;
