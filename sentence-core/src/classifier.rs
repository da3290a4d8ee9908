//! # Contrato do Classificador Treinável
//!
//! O núcleo não conhece a família do modelo (linear, árvore, recorrente):
//! apenas consome este contrato.
//!
//! - [`Trainer::train`]: fluxo de pares `(rótulo, features)` → modelo.
//! - [`Classifier::classify`]: features → rótulo.
//! - [`StateExposing`]: capacidade **opcional e separada** de modelos
//!   recorrentes, que avançam um passo por caractere e expõem o estado interno
//!   como features. Não é uma subclasse de `Classifier`: qualquer classificador
//!   pode ser combinado com qualquer provedor de estado.
//!
//! Falhas de classificação são fatais: a classificação é idempotente e sem
//! efeitos colaterais, então um erro indica um modelo corrompido.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FeatureSet, SparseVector};
use crate::tagger::Label;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("cannot train on an empty instance stream")]
    EmptyTrainingSet,
    #[error("model produced a non-finite score for label {label}")]
    NonFiniteScore { label: Label },
    #[error("{backend}: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

/// Um exemplo de treino: o rótulo de referência e as features da posição.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub label: Label,
    pub features: FeatureSet,
}

pub trait Classifier {
    fn classify(&self, features: &FeatureSet) -> Result<Label, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn classify(&self, features: &FeatureSet) -> Result<Label, ClassifierError> {
        (**self).classify(features)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&self, features: &FeatureSet) -> Result<Label, ClassifierError> {
        (**self).classify(features)
    }
}

/// Algoritmo de treino: consome instâncias e produz um modelo.
pub trait Trainer {
    type Model: Classifier;

    fn train(&self, instances: Vec<Instance>) -> Result<Self::Model, ClassifierError>;
}

/// Destino das instâncias emitidas pelo tagger em modo de treino.
pub trait InstanceSink {
    fn write(&mut self, instance: Instance) -> Result<(), ClassifierError>;
}

impl InstanceSink for Vec<Instance> {
    fn write(&mut self, instance: Instance) -> Result<(), ClassifierError> {
        self.push(instance);
        Ok(())
    }
}

/// Estado interno de um modelo recorrente após um passo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activations {
    /// Saída da camada oculta.
    pub hidden: Vec<f64>,
    /// Célula de memória.
    pub memory: Vec<f64>,
}

/// Capacidade de modelos recorrentes: avançar um caractere e expor o estado.
///
/// O tagger chama [`StateExposing::reset`] no início de cada segmento e
/// [`StateExposing::step_and_get_state`] antes de extrair as features da
/// posição corrente.
pub trait StateExposing {
    fn reset(&mut self);

    fn step_and_get_state(&mut self, ch: char) -> Result<Activations, ClassifierError>;
}

/// Fábrica de provedores de estado (um por fold ou por detector).
pub type StateFactory = dyn Fn() -> Box<dyn StateExposing> + Send + Sync;

/// Pesos de um modelo linear: feature → peso por rótulo, indexado por [`Label::index`].
pub(crate) type WeightTable = HashMap<String, [f64; Label::COUNT]>;

pub(crate) fn linear_scores(weights: &WeightTable, x: &SparseVector) -> [f64; Label::COUNT] {
    let mut scores = [0.0; Label::COUNT];
    for (name, value) in x.iter() {
        if let Some(w) = weights.get(name) {
            for (score, w) in scores.iter_mut().zip(w) {
                *score += w * value;
            }
        }
    }
    scores
}

/// Rótulo de maior pontuação; empates ficam com o primeiro em [`Label::ALL`].
pub(crate) fn best_label(scores: &[f64; Label::COUNT]) -> Result<Label, ClassifierError> {
    let mut best = Label::ALL[0];
    let mut best_score = f64::NEG_INFINITY;
    for label in Label::ALL {
        let score = scores[label.index()];
        if !score.is_finite() {
            return Err(ClassifierError::NonFiniteScore { label });
        }
        if score > best_score {
            best = label;
            best_score = score;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;

    struct Constant(Label);

    impl Classifier for Constant {
        fn classify(&self, _features: &FeatureSet) -> Result<Label, ClassifierError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_vec_collects_instances() {
        let mut sink: Vec<Instance> = Vec::new();
        let mut features = FeatureSet::new();
        features.insert("prev_outcome", FeatureValue::Category("O".into()));
        sink.write(Instance {
            label: Label::Begin,
            features,
        })
        .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].label, Label::Begin);
    }

    #[test]
    fn test_best_label_prefers_outside_on_ties() {
        assert_eq!(best_label(&[0.0, 0.0, 0.0]).unwrap(), Label::Outside);
        assert_eq!(best_label(&[0.0, 1.0, 1.0]).unwrap(), Label::Begin);
        assert_eq!(best_label(&[-1.0, -2.0, 0.5]).unwrap(), Label::Inside);
    }

    #[test]
    fn test_best_label_rejects_nan() {
        let err = best_label(&[0.0, f64::NAN, 1.0]).unwrap_err();
        assert!(matches!(err, ClassifierError::NonFiniteScore { label: Label::Begin }));
    }

    #[test]
    fn test_linear_scores_ignore_unknown_features() {
        let mut weights = WeightTable::new();
        weights.insert("bias".into(), [0.5, -1.0, 2.0]);
        let mut x = SparseVector::with_capacity(2);
        x.push("bias", 1.0);
        x.push("nunca_visto", 1.0);
        assert_eq!(linear_scores(&weights, &x), [0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_boxed_and_borrowed_classifiers_delegate() {
        let boxed: Box<dyn Classifier> = Box::new(Constant(Label::Inside));
        let fs = FeatureSet::new();
        assert_eq!(boxed.classify(&fs).unwrap(), Label::Inside);
        let borrowed = &Constant(Label::Outside);
        assert_eq!(borrowed.classify(&fs).unwrap(), Label::Outside);
    }
}
