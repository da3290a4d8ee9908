//! # Maximum Entropy (Regressão Logística) para Rótulos BIO
//!
//! Classificador discriminativo log-linear sobre as features esparsas de
//! cada posição. Combinado com a feature `prev_outcome`, o tagger forma um
//! MEMM com decodificação gulosa.
//!
//! ## Algoritmo
//! - **Treinamento**: Stochastic Gradient Descent (SGD) com regularização L2.
//! - **Predição**: rótulo de maior pontuação (o softmax é monotônico).
//!
//! O modelo calcula: P(rótulo | features) ~ exp(dot(pesos, features))

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{
    best_label, linear_scores, Classifier, ClassifierError, Instance, Trainer, WeightTable,
};
use crate::features::{FeatureSet, SparseVector};
use crate::tagger::Label;

/// Hiperparâmetros do SGD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxEntTrainer {
    /// Número de épocas.
    pub iterations: usize,
    /// Taxa de aprendizado ($\eta$).
    pub learning_rate: f64,
    /// Fator de regularização L2 ($\lambda$).
    pub lambda: f64,
}

impl Default for MaxEntTrainer {
    fn default() -> Self {
        Self {
            iterations: 20,
            learning_rate: 0.1,
            lambda: 0.001,
        }
    }
}

/// Modelo de Entropia Máxima (MaxEnt), também conhecido como Regressão Logística Multinomial.
///
/// # Fórmula
/// $$ P(y|x) = \frac{\exp(\sum_i w_i \cdot f_i(x,y))}{Z(x)} $$
/// Onde $Z(x)$ é o fator de normalização.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxEntModel {
    /// Pesos $w_{feature, rótulo}$. Pesos positivos indicam correlação positiva.
    weights: WeightTable,
}

impl MaxEntModel {
    /// Distribuição $P(y|x)$ na ordem de [`Label::ALL`].
    pub fn probabilities(&self, features: &FeatureSet) -> Result<[f64; Label::COUNT], ClassifierError> {
        let scores = linear_scores(&self.weights, &features.to_sparse());
        let probs = softmax(&scores);
        if let Some(label) = Label::ALL.into_iter().find(|l| !probs[l.index()].is_finite()) {
            return Err(ClassifierError::NonFiniteScore { label });
        }
        Ok(probs)
    }

    pub fn feature_count(&self) -> usize {
        self.weights.len()
    }
}

impl Classifier for MaxEntModel {
    fn classify(&self, features: &FeatureSet) -> Result<Label, ClassifierError> {
        best_label(&linear_scores(&self.weights, &features.to_sparse()))
    }
}

fn softmax(scores: &[f64; Label::COUNT]) -> [f64; Label::COUNT] {
    let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = scores.map(|s| (s - max_score).exp());
    let sum: f64 = exps.iter().sum();
    exps.map(|e| e / sum)
}

impl Trainer for MaxEntTrainer {
    type Model = MaxEntModel;

    /// Treina o modelo usando **Stochastic Gradient Descent (SGD)**.
    ///
    /// Para cada instância e cada rótulo:
    /// `w = w + rate * (erro * valor - lambda * w)`, com `erro = indicador - prob`.
    fn train(&self, instances: Vec<Instance>) -> Result<MaxEntModel, ClassifierError> {
        if instances.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        let encoded: Vec<(Label, SparseVector)> = instances
            .into_iter()
            .map(|inst| (inst.label, inst.features.to_sparse()))
            .collect();

        let mut weights = WeightTable::new();
        for epoch in 0..self.iterations {
            let mut correct = 0usize;
            for (truth, x) in &encoded {
                let scores = linear_scores(&weights, x);
                if best_label(&scores)? == *truth {
                    correct += 1;
                }
                let probs = softmax(&scores);

                for label in Label::ALL {
                    let i = label.index();
                    let indicator = if label == *truth { 1.0 } else { 0.0 };
                    let error = indicator - probs[i];
                    if error.abs() <= 1e-6 {
                        continue;
                    }
                    for (name, value) in x.iter() {
                        let w = weights.entry(name.to_string()).or_insert([0.0; Label::COUNT]);
                        let reg = self.lambda * w[i];
                        w[i] += self.learning_rate * (error * value - reg);
                    }
                }
            }
            debug!(
                epoch,
                accuracy = correct as f64 / encoded.len() as f64,
                "MaxEnt: época concluída"
            );
        }

        // poda de pesos próximos de zero
        weights.retain(|_, w| w.iter().any(|v| v.abs() > 1e-9));
        Ok(MaxEntModel { weights })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, GoldAnnotation, Span};
    use crate::features::FeatureValue;
    use crate::tagger::SequenceTagger;

    #[test]
    fn test_maxent_learns_tiny_document() {
        let text = "Aa. Bb. Cc. Dd.";
        let gold = GoldAnnotation {
            segments: vec![],
            sentences: vec![
                Span::new(0, 3),
                Span::new(4, 7),
                Span::new(8, 11),
                Span::new(12, 15),
            ],
        };
        let doc = Document::with_annotation("treino", text, gold).unwrap();
        let tagger = SequenceTagger::default();
        let mut instances: Vec<Instance> = Vec::new();
        tagger.train_document(&doc, &mut instances, None).unwrap();

        let trainer = MaxEntTrainer {
            iterations: 40,
            learning_rate: 0.2,
            lambda: 0.0001,
        };
        let model = trainer.train(instances).unwrap();
        let spans = tagger.decode_document(&doc, &model, None).unwrap();
        assert_eq!(spans, doc.gold_sentences());
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let mut weights = WeightTable::new();
        weights.insert("bias".into(), [0.2, 1.5, -0.3]);
        let model = MaxEntModel { weights };
        let probs = model.probabilities(&FeatureSet::new()).unwrap();
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[Label::Begin.index()] > probs[Label::Outside.index()]);
    }

    #[test]
    fn test_non_finite_weights_are_fatal() {
        let mut weights = WeightTable::new();
        weights.insert("char_upper".into(), [f64::INFINITY, 0.0, f64::NEG_INFINITY]);
        let model = MaxEntModel { weights };
        let mut fs = FeatureSet::new();
        fs.insert("char_upper", FeatureValue::Bool(true));
        assert!(matches!(
            model.classify(&fs),
            Err(ClassifierError::NonFiniteScore { .. })
        ));
    }

    #[test]
    fn test_empty_training_set_is_rejected() {
        assert!(MaxEntTrainer::default().train(Vec::new()).is_err());
    }
}
