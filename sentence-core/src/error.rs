//! # Erros do Detector de Sentenças
//!
//! Distingue defeitos de entrada (anotações ouro malformadas), falhas do
//! classificador externo e problemas de I/O ou configuração. Correções
//! recuperáveis (como `I` logo após `O`) nunca chegam aqui: são apenas logadas.

use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::document::Span;

#[derive(Debug, Error)]
pub enum SentenceError {
    #[error("gold sentence {span} starts before the end of {previous} inside segment {segment}")]
    GoldOrder {
        segment: Span,
        previous: Span,
        span: Span,
    },
    #[error("sentence {span} is not covered by any segment")]
    OrphanSentence { span: Span },
    #[error("segments {first} and {second} overlap")]
    OverlappingSegments { first: Span, second: Span },
    #[error("invalid span {span} for a text of {len} characters")]
    InvalidSpan { span: Span, len: usize },
    #[error("classifier failure: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("document `{id}` failed: {source}")]
    Document {
        id: String,
        #[source]
        source: Box<SentenceError>,
    },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
    #[error("no annotation for document `{id}`")]
    UnknownDocument { id: String },
}

impl SentenceError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Anexa o identificador do documento ao erro, sem aninhar duas vezes.
    pub(crate) fn in_document(self, id: &str) -> Self {
        match self {
            Self::Document { .. } => self,
            other => Self::Document {
                id: id.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T, E = SentenceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_wrapper_names_the_document() {
        let err = SentenceError::OrphanSentence {
            span: Span::new(3, 9),
        }
        .in_document("note-17");
        let msg = err.to_string();
        assert!(msg.contains("note-17"));
        assert!(msg.contains("[3, 9)"));
    }

    #[test]
    fn test_document_wrapper_is_not_nested() {
        let err = SentenceError::OrphanSentence {
            span: Span::new(0, 1),
        }
        .in_document("a")
        .in_document("b");
        match err {
            SentenceError::Document { id, .. } => assert_eq!(id, "a"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
