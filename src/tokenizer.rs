//! External collaborators the core treats as plug-ins (spec §6): the
//! tokeniser, the stoplist, and the stemmer. The core only ever consumes
//! these through traits; a minimal whitespace/no-op implementation of each
//! is provided so the rest of the crate can be exercised without a real
//! parser, grounded on
//! `motedb::index::text_types::WhitespaceTokenizer`'s event-free,
//! alphanumeric-run splitting approach.

/// One lexical event from the streaming tag-aware parser spec §6 describes.
/// Only `Word` carries a position increment the accumulator needs to see;
/// the rest exist so a real tokeniser's tag-handling table has somewhere to
/// route non-word events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Word(Vec<u8>),
    Tag(Vec<u8>),
    Param(Vec<u8>),
    ParamVal(Vec<u8>),
    Comment(Vec<u8>),
    Whitespace,
    Eof,
}

pub trait Tokeniser {
    fn tokenise(&self, text: &str) -> Vec<TokenEvent>;
}

/// Splits on anything that isn't ASCII alphanumeric, lowercasing words —
/// enough to drive the accumulator/merger/evaluator end to end without a
/// real markup parser.
pub struct WhitespaceTokeniser;

impl Tokeniser for WhitespaceTokeniser {
    fn tokenise(&self, text: &str) -> Vec<TokenEvent> {
        let mut events = Vec::new();
        let mut current = String::new();
        for ch in text.chars() {
            if ch.is_ascii_alphanumeric() {
                current.push(ch.to_ascii_lowercase());
            } else {
                if !current.is_empty() {
                    events.push(TokenEvent::Word(std::mem::take(&mut current).into_bytes()));
                }
                events.push(TokenEvent::Whitespace);
            }
        }
        if !current.is_empty() {
            events.push(TokenEvent::Word(current.into_bytes()));
        }
        events.push(TokenEvent::Eof);
        events
    }
}

pub trait Stopword {
    fn is_stopword(&self, term: &[u8]) -> bool;
}

pub struct NoStopword;

impl Stopword for NoStopword {
    fn is_stopword(&self, _term: &[u8]) -> bool {
        false
    }
}

pub trait Stemmer {
    fn stem<'a>(&self, term: &'a [u8]) -> std::borrow::Cow<'a, [u8]>;
}

pub struct NoStemmer;

impl Stemmer for NoStemmer {
    fn stem<'a>(&self, term: &'a [u8]) -> std::borrow::Cow<'a, [u8]> {
        std::borrow::Cow::Borrowed(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_tokeniser_splits_and_lowercases() {
        let events = WhitespaceTokeniser.tokenise("The Quick, brown-fox!");
        let words: Vec<Vec<u8>> = events
            .into_iter()
            .filter_map(|e| match e {
                TokenEvent::Word(w) => Some(w),
                _ => None,
            })
            .collect();
        assert_eq!(words, vec![b"the".to_vec(), b"quick".to_vec(), b"brown".to_vec(), b"fox".to_vec()]);
    }

    #[test]
    fn no_stopword_never_filters() {
        assert!(!NoStopword.is_stopword(b"the"));
    }

    #[test]
    fn no_stemmer_returns_input_unchanged() {
        assert_eq!(NoStemmer.stem(b"running").as_ref(), b"running");
    }
}
