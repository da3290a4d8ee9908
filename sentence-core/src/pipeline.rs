//! # Detector de Sentenças Pronto para Uso
//!
//! Conecta configuração, classificador e tagger:
//!
//! 1. [`TrainerBackend`] escolhe o algoritmo a partir do [`DetectorConfig`].
//! 2. O treino produz um [`TrainedModel`], serializável em JSON.
//! 3. [`SentenceDetector`] aplica o modelo a texto bruto (um único segmento)
//!    ou a um [`Document`] já segmentado.
//!
//! O reservoir recorrente não é serializado: é reconstruído a partir da sua
//! semente, o que reproduz exatamente os mesmos pesos.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::{Classifier, ClassifierError, Instance, StateExposing, StateFactory, Trainer};
use crate::config::{check_baseline_features, Backend, DetectorConfig};
use crate::document::{Document, Span};
use crate::error::{Result, SentenceError};
use crate::eval::Evaluator;
use crate::features::{FeatureConfig, FeatureSet};
use crate::maxent::{MaxEntModel, MaxEntTrainer};
use crate::perceptron::{PerceptronModel, PerceptronTrainer};
use crate::reservoir::{EchoStateEncoder, ReservoirConfig};
use crate::rule_based::RuleBaseline;
use crate::tagger::{Label, SequenceTagger, TaggerConfig};

/// Algoritmo de treino selecionado pela configuração.
#[derive(Debug, Clone)]
pub enum TrainerBackend {
    Perceptron(PerceptronTrainer),
    MaxEnt(MaxEntTrainer),
    Baseline(RuleBaseline),
}

impl TrainerBackend {
    pub fn from_config(config: &DetectorConfig) -> Self {
        match config.backend {
            Backend::Perceptron => TrainerBackend::Perceptron(config.perceptron),
            Backend::MaxEnt => TrainerBackend::MaxEnt(config.maxent),
            Backend::Baseline => TrainerBackend::Baseline(RuleBaseline::new()),
        }
    }
}

/// Modelo treinado por qualquer backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    Perceptron(PerceptronModel),
    #[serde(rename = "maxent")]
    MaxEnt(MaxEntModel),
    Baseline(RuleBaseline),
}

impl Classifier for TrainedModel {
    fn classify(&self, features: &FeatureSet) -> std::result::Result<Label, ClassifierError> {
        match self {
            TrainedModel::Perceptron(m) => m.classify(features),
            TrainedModel::MaxEnt(m) => m.classify(features),
            TrainedModel::Baseline(m) => m.classify(features),
        }
    }
}

impl Trainer for TrainerBackend {
    type Model = TrainedModel;

    fn train(&self, instances: Vec<Instance>) -> std::result::Result<TrainedModel, ClassifierError> {
        Ok(match self {
            TrainerBackend::Perceptron(t) => TrainedModel::Perceptron(t.train(instances)?),
            TrainerBackend::MaxEnt(t) => TrainedModel::MaxEnt(t.train(instances)?),
            TrainerBackend::Baseline(t) => TrainedModel::Baseline(t.train(instances)?),
        })
    }
}

/// Fábrica de reservoirs para o preset recorrente; `None` nos demais presets.
///
/// Todos os reservoirs produzidos são cópias de um protótipo validado.
pub fn recurrent_factory(config: &DetectorConfig) -> Result<Option<Arc<StateFactory>>> {
    let Some(reservoir) = config.reservoir_config() else {
        return Ok(None);
    };
    let prototype = EchoStateEncoder::new(&reservoir)?;
    let factory: Arc<StateFactory> =
        Arc::new(move || Box::new(prototype.clone()) as Box<dyn StateExposing>);
    Ok(Some(factory))
}

/// Evaluator configurado com backend, tagger e reservoir da configuração.
pub fn evaluator_from_config(config: &DetectorConfig) -> Result<Evaluator<TrainerBackend>> {
    config.validate()?;
    let tagger = SequenceTagger::with_config(config.features, config.tagger);
    let evaluator = Evaluator::new(
        tagger,
        TrainerBackend::from_config(config),
        config.evaluation.clone(),
    );
    Ok(match recurrent_factory(config)? {
        Some(factory) => evaluator.with_recurrent(factory),
        None => evaluator,
    })
}

/// Forma persistida do detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorModel {
    pub features: FeatureConfig,
    pub tagger: TaggerConfig,
    pub reservoir: Option<ReservoirConfig>,
    pub model: TrainedModel,
}

/// Detector treinado, pronto para inferência.
#[derive(Debug, Clone)]
pub struct SentenceDetector {
    tagger: SequenceTagger,
    model: TrainedModel,
    reservoir: Option<ReservoirConfig>,
    encoder: Option<EchoStateEncoder>,
}

impl SentenceDetector {
    pub fn from_model(saved: DetectorModel) -> Result<Self> {
        let encoder = match (&saved.reservoir, saved.features.families().recurrent) {
            (Some(config), true) => Some(EchoStateEncoder::new(config)?),
            (None, true) => {
                return Err(SentenceError::invalid_config(
                    "recurrent feature preset requires reservoir parameters",
                ))
            }
            (_, false) => None,
        };
        if let TrainedModel::Baseline(_) = saved.model {
            check_baseline_features(&saved.features)?;
        }
        Ok(Self {
            tagger: SequenceTagger::with_config(saved.features, saved.tagger),
            model: saved.model,
            reservoir: saved.reservoir,
            encoder,
        })
    }

    /// Treina um detector em todo o corpus.
    pub fn train(config: &DetectorConfig, docs: &[Document]) -> Result<Self> {
        let evaluator = evaluator_from_config(config)?;
        let model = evaluator.train_all(docs)?;
        info!(backend = %config.backend, documents = docs.len(), "Detector treinado");
        Self::from_model(DetectorModel {
            features: config.features,
            tagger: config.tagger,
            reservoir: config.reservoir_config(),
            model,
        })
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Detecta sentenças em texto bruto, tratado como um único segmento.
    pub fn detect(&self, text: &str) -> Result<Vec<Span>> {
        self.detect_document(&Document::new("input", text))
    }

    /// Detecta sentenças em cada segmento do documento.
    pub fn detect_document(&self, doc: &Document) -> Result<Vec<Span>> {
        let mut encoder = self.encoder.clone();
        self.tagger.decode_document(
            doc,
            &self.model,
            encoder.as_mut().map(|e| e as &mut dyn StateExposing),
        )
    }

    /// Texto de cada sentença detectada.
    pub fn sentences(&self, text: &str) -> Result<Vec<String>> {
        let doc = Document::new("input", text);
        let spans = self.detect_document(&doc)?;
        Ok(spans.into_iter().map(|s| doc.covered_text(s)).collect())
    }

    pub fn to_model(&self) -> DetectorModel {
        DetectorModel {
            features: *self.tagger.features(),
            tagger: *self.tagger.config(),
            reservoir: self.reservoir.clone(),
            model: self.model.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(&self.to_model())
            .map_err(|e| SentenceError::json("serializing detector", e))?;
        std::fs::write(path, json).map_err(|e| SentenceError::io("writing detector", e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SentenceError::io("reading detector", e))?;
        let saved: DetectorModel = serde_json::from_str(&json)
            .map_err(|e| SentenceError::json("parsing detector", e))?;
        Self::from_model(saved)
    }
}
