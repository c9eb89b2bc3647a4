//! Change notices pushed by providers.
//!
//! A provider announces a fresh component value by touching the path
//! `<card id>/<component id>` under its endpoint. Anything else is ignored.

/// A parsed change notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentNotice<'a> {
    pub card_id: &'a str,
    pub component_id: &'a str,
}

impl<'a> ComponentNotice<'a> {
    /// `None` unless `path` has exactly two segments. Empty segments (from
    /// leading, trailing or doubled `/`) are skipped.
    #[must_use]
    pub fn parse(path: &'a str) -> Option<Self> {
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        let card_id = segments.next()?;
        let component_id = segments.next()?;
        if segments.next().is_some() {
            return None;
        }
        Some(Self {
            card_id,
            component_id,
        })
    }
}
