use crate::error::SlateError;

pub type SlateResult<T> = Result<T, SlateError>;
