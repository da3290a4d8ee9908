//! # Modelo de Documento
//!
//! Visão somente-leitura de um documento clínico: o texto, os **segmentos**
//! (regiões rotuladas de forma independente) e, quando disponíveis, as
//! sentenças ouro de cada segmento.
//!
//! Todos os offsets são **índices de caractere** (não de byte), no intervalo
//! semiaberto `[begin, end)`. O texto é mantido também como `Vec<char>` para
//! indexação O(1) pelo extrator de features.
//!
//! ## Invariantes
//! - Segmentos nunca se sobrepõem e nunca são vazios.
//! - Toda sentença ouro tem `begin < end` e está contida em exatamente um segmento.
//! - Dentro de um segmento, as sentenças vêm em ordem crescente e sem
//!   sobreposição. Ordem inválida é rejeitada, nunca reordenada.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SentenceError};

/// Intervalo de caracteres `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    /// `other` está inteiramente dentro de `self`.
    pub fn contains(&self, other: &Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}

/// Anotação ouro de um documento, como entregue pelo provedor externo.
///
/// Construída uma vez por documento e imutável a partir daí.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldAnnotation {
    #[serde(default)]
    pub segments: Vec<Span>,
    #[serde(default)]
    pub sentences: Vec<Span>,
}

/// Provedor de anotações ouro (ex: leitor de XML Anafora, arquivos JSON).
///
/// O núcleo exige apenas que as sentenças de um segmento possam ser
/// recuperadas em ordem crescente de `begin`.
pub trait AnnotationProvider {
    fn annotate(&self, document_id: &str) -> Result<GoldAnnotation>;
}

/// Um documento pronto para treino, inferência ou avaliação.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    text: String,
    chars: Vec<char>,
    segments: Vec<Span>,
    sentences: Vec<Span>,
}

impl Document {
    /// Documento sem anotação ouro, com um único segmento cobrindo todo o texto.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let chars: Vec<char> = text.chars().collect();
        let segments = whole_text_segment(chars.len());
        Self {
            id: id.into(),
            text,
            chars,
            segments,
            sentences: Vec::new(),
        }
    }

    /// Documento com segmentos e sentenças ouro validados.
    ///
    /// Sem segmentos explícitos, o texto inteiro vira um único segmento.
    /// Qualquer defeito estrutural é fatal para este documento e o erro
    /// carrega o seu identificador.
    pub fn with_annotation(
        id: impl Into<String>,
        text: impl Into<String>,
        gold: GoldAnnotation,
    ) -> Result<Self> {
        let id = id.into();
        let text = text.into();
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        let mut segments = if gold.segments.is_empty() {
            whole_text_segment(len)
        } else {
            gold.segments
        };
        segments.sort();

        let validated = validate(&segments, &gold.sentences, len);
        validated.map_err(|e| e.in_document(&id))?;

        Ok(Self {
            id,
            text,
            chars,
            segments,
            sentences: gold.sentences,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Comprimento em caracteres.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Segmentos em ordem crescente de posição.
    pub fn segments(&self) -> &[Span] {
        &self.segments
    }

    /// Todas as sentenças ouro, na ordem do provedor.
    pub fn gold_sentences(&self) -> &[Span] {
        &self.sentences
    }

    /// Sentenças ouro cobertas por `segment`, preservando a ordem do provedor.
    pub fn sentences_in(&self, segment: Span) -> Vec<Span> {
        self.sentences
            .iter()
            .copied()
            .filter(|s| segment.contains(s))
            .collect()
    }

    /// Caracteres do segmento (offsets relativos começam em 0).
    pub fn segment_chars(&self, segment: Span) -> &[char] {
        &self.chars[segment.begin..segment.end]
    }

    /// Texto coberto por `span`, ou string vazia se estiver fora dos limites.
    pub fn covered_text(&self, span: Span) -> String {
        if span.end > self.chars.len() || span.is_empty() {
            return String::new();
        }
        self.chars[span.begin..span.end].iter().collect()
    }
}

fn whole_text_segment(len: usize) -> Vec<Span> {
    if len == 0 {
        Vec::new()
    } else {
        vec![Span::new(0, len)]
    }
}

fn validate(segments: &[Span], sentences: &[Span], len: usize) -> Result<()> {
    for span in segments.iter().chain(sentences) {
        if span.is_empty() || span.end > len {
            return Err(SentenceError::InvalidSpan { span: *span, len });
        }
    }

    // `segments` já está ordenado
    for pair in segments.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            return Err(SentenceError::OverlappingSegments {
                first: pair[0],
                second: pair[1],
            });
        }
    }

    for sentence in sentences {
        let covering = segments.iter().filter(|seg| seg.contains(sentence)).count();
        if covering != 1 {
            return Err(SentenceError::OrphanSentence { span: *sentence });
        }
    }

    // dentro de cada segmento, na ordem do provedor, sem sobreposição
    for &segment in segments {
        let mut inside = sentences.iter().copied().filter(|s| segment.contains(s));
        let Some(mut previous) = inside.next() else {
            continue;
        };
        for span in inside {
            if span.begin < previous.end {
                return Err(SentenceError::GoldOrder {
                    segment,
                    previous,
                    span,
                });
            }
            previous = span;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_document_has_single_segment() {
        let doc = Document::new("d", "Paciente estável.");
        assert_eq!(doc.segments(), &[Span::new(0, 17)]);
        assert!(doc.gold_sentences().is_empty());
    }

    #[test]
    fn test_empty_document_has_no_segments() {
        let doc = Document::new("vazio", "");
        assert!(doc.segments().is_empty());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_offsets_are_characters_not_bytes() {
        // "ç" e "ã" ocupam 2 bytes cada em UTF-8
        let doc = Document::new("d", "Ação clínica.");
        assert_eq!(doc.len(), 13);
        assert_eq!(doc.covered_text(Span::new(0, 4)), "Ação");
    }

    #[test]
    fn test_sentences_in_segment_keep_provider_order() {
        let gold = GoldAnnotation {
            segments: vec![Span::new(10, 20), Span::new(0, 10)],
            sentences: vec![Span::new(12, 15), Span::new(1, 4), Span::new(16, 19)],
        };
        let doc = Document::with_annotation("d", "x".repeat(20), gold).unwrap();
        assert_eq!(doc.segments(), &[Span::new(0, 10), Span::new(10, 20)]);
        assert_eq!(
            doc.sentences_in(Span::new(10, 20)),
            vec![Span::new(12, 15), Span::new(16, 19)]
        );
    }

    #[test]
    fn test_overlapping_segments_are_rejected() {
        let gold = GoldAnnotation {
            segments: vec![Span::new(0, 6), Span::new(5, 10)],
            sentences: vec![],
        };
        let err = Document::with_annotation("sobreposto", "x".repeat(10), gold).unwrap_err();
        assert!(err.to_string().contains("sobreposto"));
    }

    #[test]
    fn test_sentence_outside_segments_is_rejected() {
        let gold = GoldAnnotation {
            segments: vec![Span::new(0, 5)],
            sentences: vec![Span::new(3, 8)],
        };
        let err = Document::with_annotation("orfao", "x".repeat(10), gold).unwrap_err();
        match err {
            SentenceError::Document { id, source } => {
                assert_eq!(id, "orfao");
                assert!(matches!(*source, SentenceError::OrphanSentence { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_order_sentences_are_rejected() {
        let gold = GoldAnnotation {
            segments: vec![],
            sentences: vec![Span::new(4, 9), Span::new(0, 3)],
        };
        let err = Document::with_annotation("ruim", "Um. Dois.", gold).unwrap_err();
        match err {
            SentenceError::Document { id, source } => {
                assert_eq!(id, "ruim");
                assert!(matches!(*source, SentenceError::GoldOrder { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overlapping_sentences_are_rejected() {
        let gold = GoldAnnotation {
            segments: vec![],
            sentences: vec![Span::new(0, 6), Span::new(4, 9)],
        };
        let err = Document::with_annotation("ruim", "Um. Dois.", gold).unwrap_err();
        assert!(err.to_string().contains("ruim"));
    }

    #[test]
    fn test_sentences_in_different_segments_are_checked_separately() {
        // a ordem global não importa; só a ordem dentro do segmento
        let gold = GoldAnnotation {
            segments: vec![Span::new(0, 5), Span::new(5, 10)],
            sentences: vec![Span::new(6, 9), Span::new(1, 4)],
        };
        assert!(Document::with_annotation("d", "x".repeat(10), gold).is_ok());
    }

    #[test]
    fn test_empty_sentence_is_rejected() {
        let gold = GoldAnnotation {
            segments: vec![],
            sentences: vec![Span::new(4, 4)],
        };
        assert!(Document::with_annotation("d", "abcdefgh", gold).is_err());
    }
}
