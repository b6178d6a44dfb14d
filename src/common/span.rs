use std::rc::Rc;

use crate::common::source::Source;

/// A `Span` refers to a section of a source,
/// much like a `&str`, but with a reference to a `Source`
/// rather than a `String`. Spans are paired with most
/// compiler datastructures, to be used during error
/// reporting and when synthesized nodes need to inherit a
/// source range.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Span {
    pub source: Option<Rc<Source>>,
    pub offset: usize,
    pub length: usize,
}

impl Span {
    /// Create a new `Span` from an offset with a length.
    /// All `Span`s have access to the `Source` from whence
    /// they came, so they can't be miscombined.
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span {
            source: Some(Rc::clone(source)),
            offset,
            length,
        }
    }

    /// A `Span` that points at a specific point in the source.
    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span {
            source: Some(Rc::clone(source)),
            offset,
            length: 1,
        }
    }

    /// Create a new empty `Span`.
    /// An empty `Span` has no source; if combined with
    /// another `Span`, the resulting `Span` will just be
    /// the other.
    pub fn empty() -> Span {
        Span {
            source: None,
            offset: 0,
            length: 0,
        }
    }

    /// Checks if a `Span` is empty.
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    /// Creates a new `Span` which spans the space of the
    /// previous two.
    /// ```plain
    /// hello this is cool
    /// ^^^^^              | Span a
    ///            ^^      | Span b
    /// ^^^^^^^^^^^^^      | combined
    /// ```
    pub fn combine(a: &Span, b: &Span) -> Span {
        if a.is_empty() {
            return b.clone();
        }
        if b.is_empty() {
            return a.clone();
        }

        let offset = a.offset.min(b.offset);
        let end = (a.offset + a.length).max(b.offset + b.length);

        Span::new(a.source.as_ref().unwrap(), offset, end - offset)
    }

    /// Returns the contents of a `Span`.
    /// This indexes into the source file, so the `Span`
    /// must not be empty.
    pub fn contents(&self) -> String {
        let source = self.source.as_ref().expect("an empty span has no contents");
        source.contents[self.offset..(self.offset + self.length).min(source.contents.len())]
            .to_string()
    }

    /// The path of the source this span points into, as a
    /// displayable string.
    pub fn path(&self) -> String {
        match self.source {
            Some(ref source) => source.path.display().to_string(),
            None => "<not a file>".to_string(),
        }
    }

    /// One-indexed line number of the start of the span.
    pub fn line(&self) -> usize {
        let source = self.source.as_ref().expect("an empty span has no line");
        source.contents[..self.offset.min(source.contents.len())]
            .matches('\n')
            .count()
            + 1
    }

    /// Zero-indexed column of the start of the span.
    pub fn column(&self) -> usize {
        let source = self.source.as_ref().expect("an empty span has no column");
        let upto = &source.contents[..self.offset.min(source.contents.len())];
        match upto.rfind('\n') {
            Some(n) => self.offset - n - 1,
            None => self.offset,
        }
    }

    /// The full text of the line the span starts on,
    /// without its trailing newline.
    pub fn line_contents(&self) -> String {
        let source = self.source.as_ref().expect("an empty span has no line");
        let contents = &source.contents;
        let start = contents[..self.offset.min(contents.len())]
            .rfind('\n')
            .map(|n| n + 1)
            .unwrap_or(0);
        let end = contents[self.offset.min(contents.len())..]
            .find('\n')
            .map(|n| n + self.offset)
            .unwrap_or(contents.len());
        contents[start..end].to_string()
    }
}

/// A wrapper to pair a compiler datastructure with the
/// `Span` it originated from, for example a `Spanned<Token>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combination() {
        let source = Source::source("heck, that's awesome");
        let a = Span::new(&source, 0, 5);
        let b = Span::new(&source, 11, 2);

        assert_eq!(Span::combine(&a, &b), Span::new(&source, 0, 13));
    }

    #[test]
    fn lines_and_columns() {
        let source = Source::source("one\ntwo three\nfour");
        let span = Span::new(&source, 8, 5);

        assert_eq!(span.line(), 2);
        assert_eq!(span.column(), 4);
        assert_eq!(span.line_contents(), "two three");
        assert_eq!(span.contents(), "three");
    }

    #[test]
    fn empty_combines_to_other() {
        let source = Source::source("snippet");
        let span = Span::new(&source, 1, 3);

        assert_eq!(Span::combine(&Span::empty(), &span), span);
    }
}
