/// Newline delimited text framing.
pub(crate) mod lines;
