//! # Baseline de Regras
//!
//! Classificador sem aprendizado que decide o rótulo de cada posição a partir
//! das próprias features do tagger. Serve de piso para comparar modelos
//! treinados e para executar a avaliação sem nenhum backend estatístico.
//!
//! ## Regras
//!
//! Fora de uma sentença (`prev_outcome=O`), qualquer caractere que não seja
//! espaço abre uma nova sentença. Dentro de uma sentença, um espaço encerra a
//! sentença quando:
//!
//! - o caractere anterior é pontuação final (`.`, `?`, `!`) e o token anterior
//!   não é uma abreviação conhecida (ex: "Dr.", "p.ex.");
//! - ou é uma quebra de linha seguida de outra (linha em branco).

use serde::{Deserialize, Serialize};

use crate::classifier::{Classifier, ClassifierError, Instance, Trainer};
use crate::features::FeatureSet;
use crate::tagger::Label;

/// Abreviações comuns em notas clínicas que terminam em ponto sem encerrar a sentença.
const CLINICAL_ABBREVIATIONS: &[&str] = &[
    "dr.", "dra.", "sr.", "sra.", "prof.", "profa.", "p.ex.", "ex.", "aprox.", "vs.", "e.g.",
    "i.e.", "nº.", "n.", "pág.", "cf.", "obs.",
];

/// Baseline de regras; treinar devolve uma cópia de si mesmo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBaseline {
    /// Abreviações em minúsculas, incluindo o ponto final.
    abbreviations: Vec<String>,
}

impl Default for RuleBaseline {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBaseline {
    pub fn new() -> Self {
        Self {
            abbreviations: CLINICAL_ABBREVIATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn add_abbreviation(&mut self, abbreviation: &str) {
        let lower = abbreviation.to_lowercase();
        if !self.abbreviations.contains(&lower) {
            self.abbreviations.push(lower);
        }
    }

    pub fn is_abbreviation(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.abbreviations.iter().any(|a| *a == lower)
    }

    fn ends_sentence(&self, features: &FeatureSet) -> bool {
        let before = features.category("char[-1]_type");
        let final_punct = matches!(before, Some(".") | Some("?") | Some("!"));
        if final_punct {
            let token = features.category("prev_token").unwrap_or_default();
            return !self.is_abbreviation(token);
        }
        features.category("char_type") == Some("<LF>")
            && features.category("char[+1]_type") == Some("<LF>")
    }
}

impl Classifier for RuleBaseline {
    fn classify(&self, features: &FeatureSet) -> Result<Label, ClassifierError> {
        let previous = features
            .category("prev_outcome")
            .and_then(Label::from_label)
            .unwrap_or(Label::Outside);
        let space = features.flag("char_space");

        let label = match previous {
            Label::Outside if space => Label::Outside,
            Label::Outside => Label::Begin,
            _ if space && self.ends_sentence(features) => Label::Outside,
            _ => Label::Inside,
        };
        Ok(label)
    }
}

impl Trainer for RuleBaseline {
    type Model = RuleBaseline;

    fn train(&self, _instances: Vec<Instance>) -> Result<RuleBaseline, ClassifierError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Span};
    use crate::tagger::SequenceTagger;

    fn detect(text: &str) -> Vec<Span> {
        let doc = Document::new("d", text);
        SequenceTagger::default()
            .decode_document(&doc, &RuleBaseline::new(), None)
            .unwrap()
    }

    #[test]
    fn test_final_punctuation_splits_sentences() {
        let spans = detect("Dr. Silva examinou o paciente. Sem queixas.\n\nPlano: alta");
        assert_eq!(
            spans,
            vec![Span::new(0, 30), Span::new(31, 43), Span::new(45, 56)]
        );
    }

    #[test]
    fn test_blank_line_closes_sentence_without_punctuation() {
        let spans = detect("Queixa principal\n\nDor abdominal");
        assert_eq!(spans, vec![Span::new(0, 16), Span::new(18, 31)]);
    }

    #[test]
    fn test_single_newline_does_not_split() {
        let spans = detect("Paciente relata dor\nem repouso.");
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_custom_abbreviation() {
        let mut baseline = RuleBaseline::new();
        assert!(!baseline.is_abbreviation("Cx."));
        baseline.add_abbreviation("Cx.");
        assert!(baseline.is_abbreviation("cx."));
    }

    #[test]
    fn test_training_returns_itself() {
        let baseline = RuleBaseline::new();
        let trained = baseline.train(Vec::new()).unwrap();
        assert_eq!(trained, baseline);
    }
}
