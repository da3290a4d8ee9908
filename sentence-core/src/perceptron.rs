//! # Averaged Perceptron para Rótulos BIO
//!
//! Algoritmo online simples e eficiente, o classificador padrão do detector.
//! Utiliza "Lazy Averaging" para evitar custo O(N*T) na atualização dos pesos médios.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{
    best_label, linear_scores, Classifier, ClassifierError, Instance, Trainer, WeightTable,
};
use crate::features::{FeatureSet, SparseVector};
use crate::tagger::Label;

/// Hiperparâmetros do Perceptron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptronTrainer {
    /// Número de passadas completas pelas instâncias.
    pub iterations: usize,
}

impl Default for PerceptronTrainer {
    fn default() -> Self {
        Self { iterations: 10 }
    }
}

/// Modelo Perceptron Médio (Averaged Perceptron).
///
/// O Perceptron é um algoritmo de aprendizado **online** e **mistake-driven**:
/// processa uma instância por vez e só atualiza os pesos se errar a predição.
///
/// # Averaged Perceptron
/// A versão padrão do Perceptron oscila muito. O "Averaged" usa a **média** dos pesos
/// de todos os passos como modelo final, o que reduz overfitting e estabiliza o aprendizado.
///
/// # Lazy Averaging
/// Calcular a média real a cada passo seria $O(N \cdot T)$. O acumulado de cada peso
/// só é atualizado quando a feature é ativa, mantendo custo constante por passo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerceptronModel {
    /// Pesos médios $\bar{w}$: feature → peso por rótulo.
    weights: WeightTable,
}

impl PerceptronModel {
    /// Número de features com peso.
    pub fn feature_count(&self) -> usize {
        self.weights.len()
    }
}

impl Classifier for PerceptronModel {
    fn classify(&self, features: &FeatureSet) -> Result<Label, ClassifierError> {
        best_label(&linear_scores(&self.weights, &features.to_sparse()))
    }
}

/// Estado de treino de um peso: valor atual, soma acumulada e último passo.
#[derive(Debug, Clone, Copy, Default)]
struct WeightCell {
    current: [f64; Label::COUNT],
    total: [f64; Label::COUNT],
    stamp: [usize; Label::COUNT],
}

#[derive(Debug, Default)]
struct Averager {
    cells: HashMap<String, WeightCell>,
    steps: usize,
}

impl Averager {
    fn scores(&self, x: &SparseVector) -> [f64; Label::COUNT] {
        let mut scores = [0.0; Label::COUNT];
        for (name, value) in x.iter() {
            if let Some(cell) = self.cells.get(name) {
                for (score, w) in scores.iter_mut().zip(&cell.current) {
                    *score += w * value;
                }
            }
        }
        scores
    }

    /// $w_{correto} \leftarrow w_{correto} + \phi(x)$, $w_{errado} \leftarrow w_{errado} - \phi(x)$
    fn update(&mut self, x: &SparseVector, truth: Label, predicted: Label) {
        let steps = self.steps;
        for (name, value) in x.iter() {
            let cell = self.cells.entry(name.to_string()).or_default();
            for (label, delta) in [(truth, value), (predicted, -value)] {
                let i = label.index();
                // acumula o peso antigo pelo período em que ficou constante
                cell.total[i] += (steps - cell.stamp[i]) as f64 * cell.current[i];
                cell.stamp[i] = steps;
                cell.current[i] += delta;
            }
        }
    }

    /// Fecha o acumulado no passo final e divide pelo número de passos.
    fn finalize(self) -> PerceptronModel {
        let last = self.steps;
        let steps = last as f64;
        let weights = self
            .cells
            .into_iter()
            .filter_map(|(name, mut cell)| {
                for i in 0..Label::COUNT {
                    cell.total[i] += (last - cell.stamp[i]) as f64 * cell.current[i];
                }
                let averaged = cell.total.map(|t| t / steps);
                averaged.iter().any(|w| *w != 0.0).then_some((name, averaged))
            })
            .collect();
        PerceptronModel { weights }
    }
}

impl Trainer for PerceptronTrainer {
    type Model = PerceptronModel;

    fn train(&self, instances: Vec<Instance>) -> Result<PerceptronModel, ClassifierError> {
        if instances.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        let encoded: Vec<(Label, SparseVector)> = instances
            .into_iter()
            .map(|inst| (inst.label, inst.features.to_sparse()))
            .collect();

        let mut averager = Averager::default();
        for epoch in 0..self.iterations {
            let mut mistakes = 0usize;
            for (truth, x) in &encoded {
                // predição com os pesos correntes (não médios)
                let predicted = best_label(&averager.scores(x))?;
                if predicted != *truth {
                    averager.update(x, *truth, predicted);
                    mistakes += 1;
                }
                averager.steps += 1;
            }
            debug!(epoch, mistakes, instances = encoded.len(), "Perceptron: época concluída");
        }

        Ok(averager.finalize())
    }
}
