//! # Configuração do Detector
//!
//! Agrupa features, tagger, avaliação e hiperparâmetros dos classificadores em
//! um único documento JSON. Toda seção é opcional e cai no valor padrão:
//!
//! ```json
//! {
//!   "features": { "preset": "char_shape_pos", "window": 3 },
//!   "backend": "maxent",
//!   "evaluation": { "folds": 5, "strip_final_punctuation": true },
//!   "maxent": { "iterations": 30 }
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SentenceError};
use crate::eval::EvaluationConfig;
use crate::features::FeatureConfig;
use crate::maxent::MaxEntTrainer;
use crate::perceptron::PerceptronTrainer;
use crate::reservoir::ReservoirConfig;
use crate::tagger::TaggerConfig;

/// Maior meia-largura aceita para a janela de caracteres.
pub const MAX_WINDOW: usize = 16;

/// Família de classificador usada no treino.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backend {
    /// **Perceptron Médio** (padrão): rápido e robusto.
    #[default]
    #[serde(rename = "perceptron")]
    Perceptron,
    /// **MaxEnt**: regressão logística com SGD + L2.
    #[serde(rename = "maxent")]
    MaxEnt,
    /// **Baseline**: regras fixas, sem treino. Requer as features de
    /// caracteres e de tokens, com janela de pelo menos 1.
    #[serde(rename = "baseline")]
    Baseline,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Perceptron => "perceptron",
            Backend::MaxEnt => "maxent",
            Backend::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = SentenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "perceptron" => Ok(Backend::Perceptron),
            "maxent" => Ok(Backend::MaxEnt),
            "baseline" => Ok(Backend::Baseline),
            other => Err(SentenceError::invalid_config(format!("unknown backend `{other}`"))),
        }
    }
}

/// As regras do baseline leem `char_space`, `char[-1]_type`, `char[+1]_type`
/// e `prev_token`.
pub(crate) fn check_baseline_features(features: &FeatureConfig) -> Result<()> {
    let families = features.families();
    if families.characters && families.token_context && features.window >= 1 {
        return Ok(());
    }
    Err(SentenceError::invalid_config(format!(
        "baseline backend needs character and token features with window >= 1, got preset `{}` and window {}",
        features.preset.as_str(),
        features.window
    )))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub features: FeatureConfig,
    pub tagger: TaggerConfig,
    pub evaluation: EvaluationConfig,
    pub backend: Backend,
    pub perceptron: PerceptronTrainer,
    pub maxent: MaxEntTrainer,
    /// Parâmetros do reservoir; usado apenas pelo preset `recurrent`.
    pub reservoir: Option<ReservoirConfig>,
}

impl DetectorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SentenceError::json("parsing configuration", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Lê e valida um arquivo de configuração JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SentenceError::io("reading configuration", e))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SentenceError::json("serializing configuration", e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.evaluation.folds < 2 {
            return Err(SentenceError::invalid_config("evaluation.folds must be >= 2"));
        }
        if self.features.window > MAX_WINDOW {
            return Err(SentenceError::invalid_config(format!(
                "features.window must be <= {MAX_WINDOW}"
            )));
        }
        if self.backend == Backend::Baseline {
            check_baseline_features(&self.features)?;
        }
        if self.perceptron.iterations == 0 {
            return Err(SentenceError::invalid_config("perceptron.iterations must be > 0"));
        }
        if self.maxent.iterations == 0 {
            return Err(SentenceError::invalid_config("maxent.iterations must be > 0"));
        }
        if !(self.maxent.learning_rate.is_finite() && self.maxent.learning_rate > 0.0) {
            return Err(SentenceError::invalid_config("maxent.learning_rate must be > 0"));
        }
        if !(self.maxent.lambda.is_finite() && self.maxent.lambda >= 0.0) {
            return Err(SentenceError::invalid_config("maxent.lambda must be >= 0"));
        }
        if let Some(reservoir) = &self.reservoir {
            reservoir.validate()?;
        }
        Ok(())
    }

    /// Parâmetros do reservoir quando o preset usa estado recorrente.
    pub fn reservoir_config(&self) -> Option<ReservoirConfig> {
        self.features
            .families()
            .recurrent
            .then(|| self.reservoir.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeaturePreset;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = DetectorConfig::from_json("{}").unwrap();
        assert_eq!(config, DetectorConfig::default());
        assert_eq!(config.backend, Backend::Perceptron);
        assert_eq!(config.features.preset, FeaturePreset::CharShape);
        assert_eq!(config.features.window, 3);
        assert_eq!(config.evaluation.folds, 5);
    }

    #[test]
    fn test_partial_sections() {
        let json = r#"{
            "features": { "preset": "char_shape_pos" },
            "backend": "maxent",
            "evaluation": { "strip_final_punctuation": true },
            "maxent": { "iterations": 30 }
        }"#;
        let config = DetectorConfig::from_json(json).unwrap();
        assert_eq!(config.features.preset, FeaturePreset::CharShapePos);
        assert_eq!(config.features.window, 3);
        assert_eq!(config.backend, Backend::MaxEnt);
        assert!(config.evaluation.strip_final_punctuation);
        assert_eq!(config.maxent.iterations, 30);
        assert_eq!(config.maxent.learning_rate, MaxEntTrainer::default().learning_rate);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for json in [
            r#"{"evaluation": {"folds": 1}}"#,
            r#"{"features": {"window": 17}}"#,
            r#"{"perceptron": {"iterations": 0}}"#,
            r#"{"maxent": {"learning_rate": 0.0}}"#,
            r#"{"reservoir": {"hidden_size": 0}}"#,
            r#"{"backend": "baseline", "features": {"preset": "line_pos"}}"#,
            r#"{"backend": "baseline", "features": {"preset": "shape"}}"#,
            r#"{"backend": "baseline", "features": {"window": 0}}"#,
        ] {
            let err = DetectorConfig::from_json(json).unwrap_err();
            assert!(matches!(err, SentenceError::InvalidConfig { .. }), "{json}");
        }
    }

    #[test]
    fn test_baseline_accepts_character_and_token_presets() {
        for preset in ["char_shape", "char_shape_pos", "recurrent"] {
            let json = format!(r#"{{"backend": "baseline", "features": {{"preset": "{preset}"}}}}"#);
            assert!(DetectorConfig::from_json(&json).is_ok(), "{preset}");
        }
        // as demais famílias continuam livres para backends treinados
        assert!(DetectorConfig::from_json(r#"{"features": {"preset": "line_pos"}}"#).is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        assert!(DetectorConfig::from_json(r#"{"backend": "crf"}"#).is_err());
        assert!("crf".parse::<Backend>().is_err());
        assert_eq!("maxent".parse::<Backend>().unwrap(), Backend::MaxEnt);
    }

    #[test]
    fn test_reservoir_only_for_recurrent_preset() {
        let mut config = DetectorConfig::default();
        assert!(config.reservoir_config().is_none());
        config.features.preset = FeaturePreset::Recurrent;
        assert_eq!(config.reservoir_config(), Some(ReservoirConfig::default()));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = DetectorConfig::default();
        config.backend = Backend::Baseline;
        config.evaluation.parallel = true;
        let reloaded = DetectorConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, config);
    }
}
