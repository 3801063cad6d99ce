/// Slash separated path inside the image, as accepted by [crate::source::SourceNode::insert].
///
/// Both `/` and `\` separate components; empty components (leading, trailing or doubled
/// separators) are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoPath<'a>(&'a str);

impl<'a> IsoPath<'a> {
  pub fn new(path: &'a str) -> Self {
    Self(path)
  }

  pub fn as_str(&self) -> &'a str {
    self.0
  }

  /// Returns the components of this path as an iterator.
  pub fn components(&self) -> Components<'a> {
    Components { path: self.0 }
  }

  /// Last component, if any.
  pub fn file_name(&self) -> Option<&'a str> {
    self.components().last()
  }

  /// Every component except the last.
  pub fn parent_components(&self) -> impl Iterator<Item = &'a str> {
    let count = self.components().count();
    self.components().take(count.saturating_sub(1))
  }
}

impl<'a> From<&'a str> for IsoPath<'a> {
  fn from(path: &'a str) -> Self {
    Self::new(path)
  }
}

pub struct Components<'a> {
  path: &'a str,
}

impl<'a> Iterator for Components<'a> {
  type Item = &'a str;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if self.path.is_empty() {
        return None;
      }

      let part = match self.path.find(['/', '\\']) {
        Some(pos) => {
          let part = &self.path[..pos];
          self.path = &self.path[pos + 1..];
          part
        }
        None => std::mem::take(&mut self.path),
      };

      if !part.is_empty() {
        return Some(part);
      }
    }
  }
}
