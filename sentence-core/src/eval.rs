//! # Avaliação por Validação Cruzada
//!
//! Particiona o corpus em `k` folds, treina um classificador nos demais folds,
//! decodifica o fold separado e compara as sentenças previstas com as ouro.
//!
//! ## Regra de Comparação
//!
//! Dois spans casam apenas se `(begin, end)` forem **exatamente** iguais
//! (pertinência a conjunto, nunca sobreposição). Por documento:
//!
//! - `dropped`: sentenças ouro sem previsão idêntica;
//! - `added`: previsões sem sentença ouro idêntica.
//!
//! Cada diferença é logada em nível `debug` com ±50 caracteres de contexto:
//!
//! ```text
//! DROPPED  ...Paciente estável.¶[!Sem febre!:19-28].¶Alta amanhã...
//! ```
//!
//! ## Métricas
//!
//! Somadas as contagens dos folds: `P = ΣTP / Σprevistos`, `R = ΣTP / Σreferência`,
//! `F1 = 2PR / (P + R)`. Um denominador zero deixa a métrica **indefinida**
//! (`None`), nunca zero.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{Classifier, Instance, StateExposing, StateFactory, Trainer};
use crate::document::{Document, Span};
use crate::error::{Result, SentenceError};
use crate::span::strip_final_punctuation;
use crate::tagger::SequenceTagger;

/// Contagens de uma comparação (documento, fold ou corpus).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub true_positives: usize,
    pub predicted: usize,
    pub reference: usize,
}

impl EvaluationStats {
    pub fn new(true_positives: usize, predicted: usize, reference: usize) -> Self {
        Self {
            true_positives,
            predicted,
            reference,
        }
    }

    pub fn add(&mut self, other: &EvaluationStats) {
        self.true_positives += other.true_positives;
        self.predicted += other.predicted;
        self.reference += other.reference;
    }

    /// `TP / previstos`; indefinida sem previsões.
    pub fn precision(&self) -> Option<f64> {
        ratio(self.true_positives, self.predicted)
    }

    /// `TP / referência`; indefinida sem sentenças ouro.
    pub fn recall(&self) -> Option<f64> {
        ratio(self.true_positives, self.reference)
    }

    /// Média harmônica; indefinida se P ou R forem, ou se `P + R = 0`.
    pub fn f1(&self) -> Option<f64> {
        let (p, r) = (self.precision()?, self.recall()?);
        (p + r > 0.0).then(|| 2.0 * p * r / (p + r))
    }
}

impl std::iter::Sum for EvaluationStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, s| {
            acc.add(&s);
            acc
        })
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}

fn metric(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.3}"),
        None => "undefined".to_string(),
    }
}

impl fmt::Display for EvaluationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TP={} previstos={} referência={}",
            self.true_positives, self.predicted, self.reference
        )?;
        writeln!(f, "P\tR\tF")?;
        write!(
            f,
            "{}\t{}\t{}",
            metric(self.precision()),
            metric(self.recall()),
            metric(self.f1())
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Sentença ouro que o detector não produziu.
    Dropped,
    /// Sentença prevista que não existe no ouro.
    Added,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Dropped => "DROPPED",
            DiagnosticKind::Added => "ADDED",
        })
    }
}

/// Uma diferença entre ouro e previsão, com o texto ao redor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanDiagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub before: String,
    pub covered: String,
    pub after: String,
}

impl SpanDiagnostic {
    /// Recorta `context` caracteres de cada lado do span; quebras de linha viram `¶`.
    pub fn new(doc: &Document, kind: DiagnosticKind, span: Span, context: usize) -> Self {
        let chars = doc.chars();
        let end = span.end.min(chars.len());
        let begin = span.begin.min(end);
        let window_begin = begin.saturating_sub(context);
        let window_end = (end + context).min(chars.len());
        let render = |range: &[char]| -> String {
            range
                .iter()
                .map(|&c| if c == '\n' { '¶' } else { c })
                .collect()
        };
        Self {
            kind,
            span,
            before: render(&chars[window_begin..begin]),
            covered: render(&chars[begin..end]),
            after: render(&chars[end..window_end]),
        }
    }
}

impl fmt::Display for SpanDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  ...{}[!{}!:{}-{}]{}...",
            self.kind, self.before, self.covered, self.span.begin, self.span.end, self.after
        )
    }
}

/// Resultado da comparação de um documento.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentComparison {
    pub document: String,
    pub stats: EvaluationStats,
    pub dropped: Vec<Span>,
    pub added: Vec<Span>,
}

/// Compara previsões e ouro por igualdade exata de spans.
///
/// Retorna as contagens, os spans ouro sem par e os previstos sem par, em
/// ordem crescente.
pub fn compare_spans(predicted: &[Span], gold: &[Span]) -> (EvaluationStats, Vec<Span>, Vec<Span>) {
    let predicted: BTreeSet<Span> = predicted.iter().copied().collect();
    let gold: BTreeSet<Span> = gold.iter().copied().collect();
    let true_positives = predicted.intersection(&gold).count();
    let dropped = gold.difference(&predicted).copied().collect();
    let added = predicted.difference(&gold).copied().collect();
    let stats = EvaluationStats::new(true_positives, predicted.len(), gold.len());
    (stats, dropped, added)
}

/// Compara as previsões de um documento com o seu ouro e loga as diferenças.
pub fn compare_document(doc: &Document, predicted: &[Span], context: usize) -> DocumentComparison {
    let (stats, dropped, added) = compare_spans(predicted, doc.gold_sentences());
    for (kind, spans) in [(DiagnosticKind::Dropped, &dropped), (DiagnosticKind::Added, &added)] {
        for &span in spans {
            let diagnostic = SpanDiagnostic::new(doc, kind, span, context);
            debug!(document = doc.id(), "{diagnostic}");
        }
    }
    DocumentComparison {
        document: doc.id().to_string(),
        stats,
        dropped,
        added,
    }
}

/// Fold de cada documento: `i % k`. Estável para a mesma ordem de entrada.
pub fn fold_assignments(documents: usize, folds: usize) -> Vec<usize> {
    (0..documents).map(|i| i % folds.max(1)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub folds: usize,
    /// Remove um `.`, `?` ou `!` final das sentenças previstas antes da comparação.
    pub strip_final_punctuation: bool,
    /// Caracteres de contexto de cada lado nos diagnósticos.
    pub context_window: usize,
    /// Executa os folds em paralelo com rayon.
    pub parallel: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            strip_final_punctuation: false,
            context_window: 50,
            parallel: false,
        }
    }
}

/// Resultado de um fold (ou de uma divisão treino/teste única).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train_documents: usize,
    /// Documentos avaliados, na ordem do corpus.
    pub test_documents: Vec<String>,
    pub stats: EvaluationStats,
    pub comparisons: Vec<DocumentComparison>,
}

impl fmt::Display for FoldReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Fold {} (treino: {} documentos, teste: {} documentos)",
            self.fold,
            self.train_documents,
            self.test_documents.len()
        )?;
        write!(f, "{}", self.stats)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub folds: Vec<FoldReport>,
    pub total: EvaluationStats,
}

impl CrossValidationReport {
    pub fn from_folds(folds: Vec<FoldReport>) -> Self {
        let total = folds.iter().map(|f| f.stats).sum();
        Self { folds, total }
    }
}

impl fmt::Display for CrossValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fold in &self.folds {
            writeln!(f, "{fold}")?;
        }
        writeln!(f, "Há {} sentenças ouro neste corpus.", self.total.reference)?;
        writeln!(f, "Desempenho geral")?;
        write!(f, "{}", self.total)
    }
}

/// Conduz treino e teste do tagger com um [`Trainer`].
pub struct Evaluator<T> {
    tagger: SequenceTagger,
    trainer: T,
    config: EvaluationConfig,
    recurrent: Option<Arc<StateFactory>>,
}

impl<T: Trainer> Evaluator<T> {
    pub fn new(tagger: SequenceTagger, trainer: T, config: EvaluationConfig) -> Self {
        Self {
            tagger,
            trainer,
            config,
            recurrent: None,
        }
    }

    /// Cada treino e cada teste recebem um provedor de estado novo da fábrica.
    pub fn with_recurrent(mut self, factory: Arc<StateFactory>) -> Self {
        self.recurrent = Some(factory);
        self
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    fn new_state(&self) -> Option<Box<dyn StateExposing>> {
        self.recurrent.as_ref().map(|factory| factory())
    }

    /// Gera as instâncias dos documentos e treina um modelo.
    pub fn train(&self, docs: &[&Document]) -> Result<T::Model> {
        let mut instances: Vec<Instance> = Vec::new();
        let mut state = self.new_state();
        for doc in docs {
            self.tagger
                .train_document(doc, &mut instances, state.as_deref_mut())?;
        }
        info!(
            documents = docs.len(),
            instances = instances.len(),
            "Treinando classificador"
        );
        Ok(self.trainer.train(instances)?)
    }

    /// Decodifica e compara cada documento.
    pub fn test(&self, model: &T::Model, docs: &[&Document]) -> Result<(EvaluationStats, Vec<DocumentComparison>)> {
        let mut state = self.new_state();
        let mut stats = EvaluationStats::default();
        let mut comparisons = Vec::with_capacity(docs.len());
        for doc in docs {
            let predicted = self
                .tagger
                .decode_document(doc, model, state.as_deref_mut())?;
            let predicted = adjust_predictions(&self.config, doc, predicted);
            let comparison = compare_document(doc, &predicted, self.config.context_window);
            stats.add(&comparison.stats);
            comparisons.push(comparison);
        }
        Ok((stats, comparisons))
    }

    fn run_fold(&self, fold: usize, train: &[&Document], test: &[&Document]) -> Result<FoldReport> {
        info!(fold, train = train.len(), test = test.len(), "Iniciando fold");
        let model = self.train(train)?;
        let (stats, comparisons) = self.test(&model, test)?;
        info!(
            fold,
            tp = stats.true_positives,
            predicted = stats.predicted,
            reference = stats.reference,
            "Fold concluído"
        );
        Ok(FoldReport {
            fold,
            train_documents: train.len(),
            test_documents: test.iter().map(|d| d.id().to_string()).collect(),
            stats,
            comparisons,
        })
    }

    /// Validação cruzada em `config.folds` folds.
    pub fn cross_validate(&self, docs: &[Document]) -> Result<CrossValidationReport>
    where
        T: Sync,
    {
        let k = self.config.folds;
        if k < 2 || docs.len() < k {
            return Err(SentenceError::invalid_config(format!(
                "{k} folds need k >= 2 and at least {k} documents, got {}",
                docs.len()
            )));
        }
        let assignments = fold_assignments(docs.len(), k);
        let split = |fold: usize| split_fold(docs, &assignments, fold);

        let folds: Vec<FoldReport> = if self.config.parallel {
            (0..k)
                .into_par_iter()
                .map(|fold| {
                    let (train, test) = split(fold);
                    self.run_fold(fold, &train, &test)
                })
                .collect::<Result<_>>()?
        } else {
            (0..k)
                .map(|fold| {
                    let (train, test) = split(fold);
                    self.run_fold(fold, &train, &test)
                })
                .collect::<Result<_>>()?
        };
        Ok(CrossValidationReport::from_folds(folds))
    }

    /// Divisão fixa: treina em `train` e avalia em `test`.
    pub fn train_and_test(&self, train: &[Document], test: &[Document]) -> Result<FoldReport> {
        let train: Vec<&Document> = train.iter().collect();
        let test: Vec<&Document> = test.iter().collect();
        self.run_fold(0, &train, &test)
    }

    /// Treina o modelo final em todo o corpus.
    pub fn train_all(&self, docs: &[Document]) -> Result<T::Model> {
        let all: Vec<&Document> = docs.iter().collect();
        self.train(&all)
    }

    /// Treina em todo o corpus e avalia no próprio corpus.
    pub fn train_and_evaluate_all(&self, docs: &[Document]) -> Result<(T::Model, FoldReport)> {
        let all: Vec<&Document> = docs.iter().collect();
        let model = self.train(&all)?;
        let (stats, comparisons) = self.test(&model, &all)?;
        let report = FoldReport {
            fold: 0,
            train_documents: all.len(),
            test_documents: all.iter().map(|d| d.id().to_string()).collect(),
            stats,
            comparisons,
        };
        Ok((model, report))
    }
}

fn split_fold<'a>(
    docs: &'a [Document],
    assignments: &[usize],
    fold: usize,
) -> (Vec<&'a Document>, Vec<&'a Document>) {
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (doc, &assigned) in docs.iter().zip(assignments) {
        if assigned == fold {
            test.push(doc);
        } else {
            train.push(doc);
        }
    }
    (train, test)
}

/// Aplica o ajuste de pontuação final às previsões, se configurado.
fn adjust_predictions(config: &EvaluationConfig, doc: &Document, predicted: Vec<Span>) -> Vec<Span> {
    if !config.strip_final_punctuation {
        return predicted;
    }
    predicted
        .into_iter()
        .filter_map(|span| strip_final_punctuation(doc.chars(), span))
        .collect()
}

/// Avalia um classificador já treinado, sem treino.
pub fn evaluate_with<C: Classifier + ?Sized>(
    tagger: &SequenceTagger,
    classifier: &C,
    docs: &[Document],
    config: &EvaluationConfig,
) -> Result<EvaluationStats> {
    let mut stats = EvaluationStats::default();
    for doc in docs {
        let predicted = tagger.decode_document(doc, classifier, None)?;
        let predicted = adjust_predictions(config, doc, predicted);
        stats.add(&compare_document(doc, &predicted, config.context_window).stats);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{build_document, demo_corpus, JsonCorpus};
    use crate::document::GoldAnnotation;
    use crate::perceptron::PerceptronTrainer;
    use crate::rule_based::RuleBaseline;
    use std::collections::HashSet;

    fn round3(v: Option<f64>) -> Option<f64> {
        v.map(|x| (x * 1000.0).round() / 1000.0)
    }

    fn synthetic_corpus(n: usize) -> Vec<Document> {
        (0..n)
            .map(|i| {
                let first = format!("Paciente {i} estável.");
                let second = if i % 3 == 0 {
                    "Sem febre.".to_string()
                } else {
                    format!("Retorno em {} dias.", i % 7 + 1)
                };
                build_document(&format!("doc-{i:03}"), &[&[&first, &second], &["Alta."]]).unwrap()
            })
            .collect()
    }

    fn baseline_evaluator(folds: usize) -> Evaluator<RuleBaseline> {
        let config = EvaluationConfig {
            folds,
            ..EvaluationConfig::default()
        };
        Evaluator::new(SequenceTagger::default(), RuleBaseline::new(), config)
    }

    #[test]
    fn test_metric_arithmetic() {
        let stats = EvaluationStats::new(80, 100, 90);
        assert_eq!(round3(stats.precision()), Some(0.8));
        assert_eq!(round3(stats.recall()), Some(0.889));
        assert_eq!(round3(stats.f1()), Some(0.842));
        assert!(stats.to_string().ends_with("0.800\t0.889\t0.842"));
    }

    #[test]
    fn test_zero_denominators_are_undefined() {
        let nothing_predicted = EvaluationStats::new(0, 0, 10);
        assert_eq!(nothing_predicted.precision(), None);
        assert_eq!(nothing_predicted.recall(), Some(0.0));
        assert_eq!(nothing_predicted.f1(), None);
        assert!(nothing_predicted.to_string().contains("undefined"));

        let empty = EvaluationStats::default();
        assert_eq!(empty.recall(), None);
    }

    #[test]
    fn test_exact_span_matching() {
        let predicted = [Span::new(0, 5), Span::new(6, 10)];
        let gold = [Span::new(0, 5), Span::new(6, 11)];
        let (stats, dropped, added) = compare_spans(&predicted, &gold);
        assert_eq!(stats, EvaluationStats::new(1, 2, 2));
        assert_eq!(dropped, vec![Span::new(6, 11)]);
        assert_eq!(added, vec![Span::new(6, 10)]);
    }

    #[test]
    fn test_diagnostic_format() {
        let gold = GoldAnnotation {
            segments: vec![],
            sentences: vec![Span::new(0, 5), Span::new(6, 13)],
        };
        let doc = Document::with_annotation("d", "Alta.\nDor ok.", gold).unwrap();
        let diag = SpanDiagnostic::new(&doc, DiagnosticKind::Dropped, Span::new(6, 13), 3);
        assert_eq!(diag.to_string(), "DROPPED  ...a.¶[!Dor ok.!:6-13]...");
    }

    #[test]
    fn test_fold_assignment_is_stable_modulo() {
        assert_eq!(fold_assignments(7, 3), vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(fold_assignments(4, 3), fold_assignments(4, 3));
    }

    #[test]
    fn test_cross_validation_holds_out_each_document_once() {
        let docs = synthetic_corpus(100);
        let evaluator = baseline_evaluator(5);
        let report = evaluator.cross_validate(&docs).unwrap();
        assert_eq!(report.folds.len(), 5);

        let mut seen = HashSet::new();
        for fold in &report.folds {
            assert_eq!(fold.test_documents.len(), 20);
            assert_eq!(fold.train_documents, 80);
            for id in &fold.test_documents {
                assert!(seen.insert(id.clone()), "{id} avaliado duas vezes");
            }
        }
        assert_eq!(seen.len(), 100);

        // o baseline não depende do treino: os modelos por fold equivalem a um só
        let (_, full) = evaluator.train_and_evaluate_all(&docs).unwrap();
        let fold_predicted: usize = report.folds.iter().map(|f| f.stats.predicted).sum();
        assert_eq!(fold_predicted, full.stats.predicted);
        assert_eq!(report.total, full.stats);
    }

    #[test]
    fn test_parallel_folds_match_sequential() {
        let docs = synthetic_corpus(20);
        let sequential = baseline_evaluator(4).cross_validate(&docs).unwrap();
        let config = EvaluationConfig {
            folds: 4,
            parallel: true,
            ..EvaluationConfig::default()
        };
        let parallel = Evaluator::new(SequenceTagger::default(), RuleBaseline::new(), config)
            .cross_validate(&docs)
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_too_few_documents_for_folds() {
        let docs = synthetic_corpus(3);
        let err = baseline_evaluator(5).cross_validate(&docs).unwrap_err();
        assert!(matches!(err, SentenceError::InvalidConfig { .. }));
    }

    #[test]
    fn test_punctuation_adjuster_normalizes_gold_convention() {
        // convenção de anotação sem o ponto final
        let gold = GoldAnnotation {
            segments: vec![],
            sentences: vec![Span::new(0, 9), Span::new(11, 15)],
        };
        let doc = Document::with_annotation("d", "Sem febre. Alta.", gold).unwrap();
        let docs = vec![doc];
        let tagger = SequenceTagger::default();

        let plain = evaluate_with(&tagger, &RuleBaseline::new(), &docs, &EvaluationConfig::default()).unwrap();
        assert_eq!(plain.true_positives, 0);

        let config = EvaluationConfig {
            strip_final_punctuation: true,
            ..EvaluationConfig::default()
        };
        let adjusted = evaluate_with(&tagger, &RuleBaseline::new(), &docs, &config).unwrap();
        assert_eq!(adjusted, EvaluationStats::new(2, 2, 2));
    }

    #[test]
    fn test_perceptron_cross_validation_on_demo_corpus() {
        let docs = demo_corpus().unwrap();
        let config = EvaluationConfig {
            folds: 3,
            ..EvaluationConfig::default()
        };
        let evaluator = Evaluator::new(SequenceTagger::default(), PerceptronTrainer::default(), config);
        let report = evaluator.cross_validate(&docs).unwrap();
        let gold: usize = docs.iter().map(|d| d.gold_sentences().len()).sum();
        assert_eq!(report.total.reference, gold);
        assert!(report.to_string().contains("Desempenho geral"));
    }

    #[test]
    fn test_malformed_held_out_gold_is_fatal() {
        let test_json = r#"[{"id": "ruim", "text": "Um. Dois.",
            "sentences": [{"begin": 4, "end": 9}, {"begin": 0, "end": 6}]}]"#;
        let err = JsonCorpus::from_json(test_json)
            .unwrap()
            .documents()
            .unwrap_err();
        match err {
            SentenceError::Document { id, source } => {
                assert_eq!(id, "ruim");
                assert!(matches!(*source, SentenceError::GoldOrder { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }

        // a mesma nota com ouro válido é avaliada normalmente
        let train = synthetic_corpus(3);
        let good_json = r#"[{"id": "boa", "text": "Um. Dois.",
            "sentences": [{"begin": 0, "end": 3}, {"begin": 4, "end": 9}]}]"#;
        let test = JsonCorpus::from_json(good_json).unwrap().documents().unwrap();
        let report = baseline_evaluator(2).train_and_test(&train, &test).unwrap();
        assert_eq!(report.stats, EvaluationStats::new(2, 2, 2));
    }

    #[test]
    fn test_train_and_test_split() {
        let docs = synthetic_corpus(10);
        let (train, test) = docs.split_at(7);
        let report = baseline_evaluator(2).train_and_test(train, test).unwrap();
        assert_eq!(report.train_documents, 7);
        assert_eq!(report.test_documents, vec!["doc-007", "doc-008", "doc-009"]);
        assert_eq!(report.stats.reference, 9);
    }
}
