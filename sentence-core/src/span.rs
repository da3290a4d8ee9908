//! # Reconstrução de Spans a partir de Rótulos BIO
//!
//! Converte o fluxo de rótulos `O/B/I` por caractere em spans de sentença.
//!
//! ## Máquina de Estados
//!
//! O estado de decodificação é um valor pequeno e explícito ([`DecodeState`]),
//! passado adiante a cada caractere, nunca um campo mutável escondido:
//!
//! | anterior | atual | efeito                                       |
//! |----------|-------|----------------------------------------------|
//! | `O`      | `I`   | rótulo ilegal, corrigido para `B` (warning)  |
//! | qualquer | `B`   | fecha o span aberto (se houver), abre outro  |
//! | `B`/`I`  | `O`   | fecha o span em `pos`                        |
//! | `B`/`I`  | fim   | fecha o span no fim do segmento              |
//!
//! ## Regras de Corte
//!
//! Todo span fechado perde os espaços finais; se ficar vazio, é descartado.
//! O ajuste de pontuação final (`.`, `?`, `!`) existe apenas para comparar
//! com convenções de anotação ouro e não faz parte da rotulagem.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::Span;
use crate::tagger::Label;

/// Remove espaços finais de `[start, end)` (offsets absolutos em `text`).
///
/// Retorna `None` se o span ficar vazio.
pub fn trim_span(text: &[char], start: usize, end: usize) -> Option<Span> {
    let mut end = end.min(text.len());
    while end > start && text[end - 1].is_whitespace() {
        end -= 1;
    }
    (end > start).then(|| Span::new(start, end))
}

/// Remove um único caractere final de pontuação de sentença, se houver.
pub fn strip_final_punctuation(text: &[char], span: Span) -> Option<Span> {
    if span.is_empty() || span.end > text.len() {
        return None;
    }
    match text[span.end - 1] {
        '.' | '?' | '!' => {
            let stripped = Span::new(span.begin, span.end - 1);
            (!stripped.is_empty()).then_some(stripped)
        }
        _ => Some(span),
    }
}

/// Resultado de consumir um rótulo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Rótulo efetivo, após correção.
    pub label: Label,
    /// O rótulo previsto foi `I` logo após `O` e virou `B`.
    pub coerced: bool,
    /// Span encerrado nesta posição, já cortado.
    pub closed: Option<Span>,
}

/// Estado de decodificação de um segmento: rótulo anterior e início do span aberto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeState {
    pub previous: Label,
    pub span_start: Option<usize>,
}

impl Default for DecodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeState {
    /// Estado no início de um segmento.
    pub const fn new() -> Self {
        Self {
            previous: Label::Outside,
            span_start: None,
        }
    }

    /// Consome o rótulo previsto para a posição absoluta `pos`.
    pub fn step(self, predicted: Label, pos: usize, text: &[char]) -> (Self, Step) {
        let (label, coerced) = match (self.previous, predicted) {
            (Label::Outside, Label::Inside) => {
                warn!(
                    position = pos,
                    "Classificador previu I depois de O; usando B para preservar a estrutura BIO"
                );
                (Label::Begin, true)
            }
            (_, other) => (other, false),
        };

        let mut closed = None;
        let mut span_start = self.span_start;
        match label {
            Label::Begin => {
                if let Some(start) = span_start {
                    closed = trim_span(text, start, pos);
                }
                span_start = Some(pos);
            }
            Label::Outside => {
                if let Some(start) = span_start.take() {
                    closed = trim_span(text, start, pos);
                }
            }
            Label::Inside => {}
        }

        let next = Self {
            previous: label,
            span_start,
        };
        (
            next,
            Step {
                label,
                coerced,
                closed,
            },
        )
    }

    /// Fecha o span ainda aberto no fim do segmento.
    pub fn finish(self, segment_end: usize, text: &[char]) -> Option<Span> {
        self.span_start
            .and_then(|start| trim_span(text, start, segment_end))
    }
}

/// Reconstrói os spans de um segmento a partir da sequência completa de rótulos.
///
/// `labels[i]` é o rótulo do caractere `segment.begin + i`; `text` é o texto
/// completo do documento.
pub fn spans_from_labels(labels: &[Label], segment: Span, text: &[char]) -> Vec<Span> {
    let mut state = DecodeState::new();
    let mut spans = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        let (next, step) = state.step(label, segment.begin + i, text);
        spans.extend(step.closed);
        state = next;
    }
    spans.extend(state.finish(segment.end, text));
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagger::Label::{Begin as B, Inside as I, Outside as O};

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_whitespace_trim() {
        let text = chars("Hello world.   ");
        assert_eq!(trim_span(&text, 0, 15), Some(Span::new(0, 12)));
    }

    #[test]
    fn test_all_whitespace_span_is_discarded() {
        let text = chars("a    b");
        assert_eq!(trim_span(&text, 1, 5), None);
        assert_eq!(trim_span(&text, 3, 3), None);
    }

    #[test]
    fn test_strip_final_punctuation() {
        let text = chars("Dor? Sim! Ok");
        assert_eq!(strip_final_punctuation(&text, Span::new(0, 4)), Some(Span::new(0, 3)));
        assert_eq!(strip_final_punctuation(&text, Span::new(5, 9)), Some(Span::new(5, 8)));
        assert_eq!(strip_final_punctuation(&text, Span::new(10, 12)), Some(Span::new(10, 12)));
        // apenas um caractere é removido
        let text = chars("Hm?!");
        assert_eq!(strip_final_punctuation(&text, Span::new(0, 4)), Some(Span::new(0, 3)));
        // um span só de pontuação some
        assert_eq!(strip_final_punctuation(&text, Span::new(3, 4)), None);
    }

    #[test]
    fn test_inside_after_outside_is_coerced() {
        let text = chars("ab");
        let (state, step) = DecodeState::new().step(I, 0, &text);
        assert!(step.coerced);
        assert_eq!(step.label, B);
        assert_eq!(state.span_start, Some(0));
    }

    #[test]
    fn test_spans_from_labels() {
        let text = chars("Ab. Cd.  ");
        let labels = [B, I, I, O, B, I, I, I, I];
        let spans = spans_from_labels(&labels, Span::new(0, 9), &text);
        // o segundo span termina no fim do segmento e perde os espaços
        assert_eq!(spans, vec![Span::new(0, 3), Span::new(4, 7)]);
    }

    #[test]
    fn test_begin_after_inside_splits_adjacent_sentences() {
        let text = chars("Ab.Cd.");
        let labels = [B, I, I, B, I, I];
        let spans = spans_from_labels(&labels, Span::new(0, 6), &text);
        assert_eq!(spans, vec![Span::new(0, 3), Span::new(3, 6)]);
    }

    #[test]
    fn test_no_inside_after_outside_in_output() {
        let text = chars("abcdef");
        let predicted = [I, O, I, I, O, I];
        let mut state = DecodeState::new();
        let mut emitted = Vec::new();
        for (pos, &label) in predicted.iter().enumerate() {
            let (next, step) = state.step(label, pos, &text);
            emitted.push(step.label);
            state = next;
        }
        for pair in emitted.windows(2) {
            assert!(Label::is_valid_transition(pair[0], pair[1]));
        }
        assert_eq!(emitted[0], B);
    }

    #[test]
    fn test_segment_offset_is_respected() {
        let text = chars("xxxx Ok.");
        let spans = spans_from_labels(&[B, I, I], Span::new(5, 8), &text);
        assert_eq!(spans, vec![Span::new(5, 8)]);
    }
}
