//! # Reservoir Recorrente (Echo State Network)
//!
//! Provedor de estado recorrente para a família de features `rnn_*`. Em vez
//! de treinar uma rede recorrente, usa um **reservoir** de pesos aleatórios
//! fixos: a cada caractere o estado oculto é atualizado e exposto ao
//! classificador linear, que aprende a ler o reservoir.
//!
//! ## Atualização
//!
//! $$ h_t = (1 - a) h_{t-1} + a \tanh(W_{in} e(c_t) + W h_{t-1}) $$
//! $$ m_t = 0.9\, m_{t-1} + 0.1\, h_t $$
//!
//! - `e(c)`: one-hot do caractere no vocabulário.
//! - `a`: taxa de vazamento (`leak`).
//! - `m`: traço lento do estado, exposto como `rnn_mem_*`.
//!
//! Caracteres fora do vocabulário são lidos como espaço.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::{Activations, ClassifierError, StateExposing};
use crate::error::{Result, SentenceError};

const MEMORY_DECAY: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservoirConfig {
    pub hidden_size: usize,
    /// Raio espectral aproximado de `W`; abaixo de 1 o estado esquece o passado.
    pub spectral_scale: f64,
    pub leak: f64,
    pub seed: u64,
    /// Caracteres conhecidos; vazio usa o vocabulário padrão.
    pub vocabulary: String,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self {
            hidden_size: 32,
            spectral_scale: 0.9,
            leak: 0.3,
            seed: 13,
            vocabulary: String::new(),
        }
    }
}

impl ReservoirConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 {
            return Err(SentenceError::invalid_config("reservoir.hidden_size must be > 0"));
        }
        if !(self.leak > 0.0 && self.leak <= 1.0) {
            return Err(SentenceError::invalid_config("reservoir.leak must be in (0, 1]"));
        }
        if !(self.spectral_scale.is_finite() && self.spectral_scale > 0.0) {
            return Err(SentenceError::invalid_config(
                "reservoir.spectral_scale must be a positive number",
            ));
        }
        Ok(())
    }
}

/// ASCII imprimível, quebras de linha, tab e as letras acentuadas do português.
pub fn default_vocabulary() -> Vec<char> {
    let mut vocab: Vec<char> = (' '..='~').collect();
    vocab.extend(['\n', '\r', '\t']);
    vocab.extend("áàâãéêíóôõúüçÁÀÂÃÉÊÍÓÔÕÚÜÇºª°".chars());
    vocab
}

/// Reservoir de pesos fixos que expõe o estado após cada caractere.
#[derive(Debug, Clone)]
pub struct EchoStateEncoder {
    index: HashMap<char, usize>,
    /// `input[c][h]`: peso da entrada `c` na unidade `h`.
    input: Vec<Vec<f64>>,
    recurrent: Vec<Vec<f64>>,
    leak: f64,
    hidden: Vec<f64>,
    memory: Vec<f64>,
    warned: HashSet<char>,
}

impl EchoStateEncoder {
    pub fn new(config: &ReservoirConfig) -> Result<Self> {
        config.validate()?;
        let vocabulary = if config.vocabulary.is_empty() {
            default_vocabulary()
        } else {
            let mut vocab: Vec<char> = config.vocabulary.chars().collect();
            if !vocab.contains(&' ') {
                vocab.push(' ');
            }
            vocab
        };

        let mut index = HashMap::new();
        for ch in vocabulary {
            let next = index.len();
            index.entry(ch).or_insert(next);
        }

        let n = config.hidden_size;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let input = (0..index.len())
            .map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        // entradas uniformes em [-1, 1) têm raio espectral ~ sqrt(n / 3)
        let scale = config.spectral_scale / (n as f64 / 3.0).sqrt();
        let recurrent = (0..n)
            .map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0) * scale).collect())
            .collect();

        Ok(Self {
            index,
            input,
            recurrent,
            leak: config.leak,
            hidden: vec![0.0; n],
            memory: vec![0.0; n],
            warned: HashSet::new(),
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden.len()
    }

    fn symbol(&mut self, ch: char) -> usize {
        if let Some(&i) = self.index.get(&ch) {
            return i;
        }
        if self.warned.insert(ch) {
            warn!(character = ?ch, "Caractere fora do vocabulário do reservoir; usando espaço");
        }
        self.index.get(&' ').copied().unwrap_or(0)
    }
}

impl StateExposing for EchoStateEncoder {
    fn reset(&mut self) {
        self.hidden.iter_mut().for_each(|h| *h = 0.0);
        self.memory.iter_mut().for_each(|m| *m = 0.0);
    }

    fn step_and_get_state(&mut self, ch: char) -> std::result::Result<Activations, ClassifierError> {
        let symbol = self.symbol(ch);
        let inputs = &self.input[symbol];
        let next: Vec<f64> = self
            .recurrent
            .iter()
            .zip(inputs)
            .zip(&self.hidden)
            .map(|((row, w_in), h)| {
                let drive: f64 = row.iter().zip(&self.hidden).map(|(w, x)| w * x).sum();
                (1.0 - self.leak) * h + self.leak * (w_in + drive).tanh()
            })
            .collect();
        if next.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::Backend {
                backend: "reservoir",
                message: format!("non-finite state after {ch:?}"),
            });
        }
        self.hidden = next;
        for (m, h) in self.memory.iter_mut().zip(&self.hidden) {
            *m = MEMORY_DECAY * *m + (1.0 - MEMORY_DECAY) * h;
        }
        Ok(Activations {
            hidden: self.hidden.clone(),
            memory: self.memory.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(encoder: &mut EchoStateEncoder, text: &str) -> Activations {
        let mut last = Activations::default();
        for ch in text.chars() {
            last = encoder.step_and_get_state(ch).unwrap();
        }
        last
    }

    #[test]
    fn test_same_seed_same_states() {
        let config = ReservoirConfig::default();
        let mut a = EchoStateEncoder::new(&config).unwrap();
        let mut b = EchoStateEncoder::new(&config).unwrap();
        assert_eq!(run(&mut a, "Paciente."), run(&mut b, "Paciente."));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut encoder = EchoStateEncoder::new(&ReservoirConfig::default()).unwrap();
        let first = run(&mut encoder, "Ab");
        run(&mut encoder, "qualquer coisa");
        encoder.reset();
        assert_eq!(run(&mut encoder, "Ab"), first);
    }

    #[test]
    fn test_unknown_character_reads_as_space() {
        let mut encoder = EchoStateEncoder::new(&ReservoirConfig::default()).unwrap();
        let with_space = run(&mut encoder, "a b");
        encoder.reset();
        assert_eq!(run(&mut encoder, "a\u{2603}b"), with_space);
    }

    #[test]
    fn test_state_is_bounded() {
        let config = ReservoirConfig {
            hidden_size: 8,
            ..ReservoirConfig::default()
        };
        let mut encoder = EchoStateEncoder::new(&config).unwrap();
        let acts = run(&mut encoder, &"Texto longo. ".repeat(50));
        assert_eq!(acts.hidden.len(), 8);
        assert_eq!(acts.memory.len(), 8);
        assert!(acts.hidden.iter().all(|h| h.abs() <= 1.0));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ReservoirConfig {
            leak: 0.0,
            ..ReservoirConfig::default()
        };
        assert!(EchoStateEncoder::new(&config).is_err());
    }
}
