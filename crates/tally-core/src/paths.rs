/// Last component of a `/`- or `\`-separated path. Inputs with no separator,
/// or ending in one, come back unchanged.
#[must_use]
pub fn end_of_path(input: &str) -> &str {
  for sep in ['/', '\\'] {
    if let Some(idx) = input.rfind(sep)
      && idx + 1 < input.len()
    {
      return &input[idx + 1..];
    }
  }
  input
}
