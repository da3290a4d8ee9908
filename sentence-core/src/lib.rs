//! # sentence-core — Detecção de Fronteiras de Sentença em Textos Clínicos
//!
//! Este crate trata a segmentação em sentenças como rotulagem de sequência
//! no nível de **caractere**: cada posição recebe `B` (início de sentença),
//! `I` (dentro de sentença) ou `O` (fora), e as sentenças são reconstruídas a
//! partir da sequência de rótulos.
//!
//! ## Arquitetura do Sistema
//!
//! 1.  **Documento** ([`document`]): texto, segmentos (regiões em que sentenças
//!     podem ocorrer) e sentenças ouro, todos como intervalos `[begin, end)`
//!     de índices de caractere.
//! 2.  **Extração de Features** ([`features`]): cada caractere vira um conjunto
//!     de features nomeadas (classe do caractere, forma dos tokens vizinhos,
//!     posição na linha, estado recorrente) conforme o [`FeaturePreset`].
//! 3.  **Tagging** ([`tagger`]): percorre cada segmento da esquerda para a
//!     direita, alimentando o rótulo anterior de volta como feature, tanto no
//!     treino quanto na decodificação.
//! 4.  **Reconstrução** ([`span`]): converte os rótulos em sentenças, coagindo
//!     `I` após `O` para `B` e removendo espaços finais.
//! 5.  **Classificadores** ([`perceptron`], [`maxent`], [`rule_based`]): por
//!     trás do trait [`Classifier`], com estado recorrente opcional em
//!     [`reservoir`].
//! 6.  **Avaliação** ([`eval`]): validação cruzada em k folds com precisão,
//!     revocação e F1 de casamento exato, e diagnósticos DROPPED/ADDED.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use sentence_core::{corpus::demo_corpus, DetectorConfig, SentenceDetector};
//!
//! let docs = demo_corpus().unwrap();
//! let detector = SentenceDetector::train(&DetectorConfig::default(), &docs).unwrap();
//!
//! for sentence in detector.sentences("Paciente estável. Alta amanhã.").unwrap() {
//!     println!("{sentence}");
//! }
//! ```
//!
//! ## Módulos Principais
//!
//! - [`pipeline`]: detector pronto para uso e montagem a partir da configuração.
//! - [`config`]: configuração JSON do detector.
//! - [`corpus`]: corpus clínico de demonstração e leitura de corpora JSON.

pub mod classifier;
pub mod config;
pub mod corpus;
pub mod document;
pub mod error;
pub mod eval;
pub mod features;
pub mod maxent;
pub mod perceptron;
pub mod pipeline;
pub mod reservoir;
pub mod rule_based;
pub mod span;
pub mod tagger;

pub use classifier::{Classifier, ClassifierError, Instance, StateExposing, Trainer};
pub use config::{Backend, DetectorConfig};
pub use document::{AnnotationProvider, Document, GoldAnnotation, Span};
pub use error::{Result, SentenceError};
pub use eval::{CrossValidationReport, EvaluationConfig, EvaluationStats, Evaluator, FoldReport};
pub use features::{FeatureConfig, FeaturePreset, FeatureSet};
pub use pipeline::{DetectorModel, SentenceDetector, TrainedModel, TrainerBackend};
pub use tagger::{Label, SequenceTagger, TaggerConfig};
