pub(crate) mod decode;
pub(crate) mod media;
pub(crate) mod resolve;
