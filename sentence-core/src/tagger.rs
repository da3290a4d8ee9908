//! # Rotulagem BIO por Caractere
//!
//! Define o esquema de rótulos e o **tagger sequencial** que percorre cada
//! segmento da esquerda para a direita, um caractere por vez.
//!
//! ## Esquema BIO
//!
//! - `B`: Begin, primeiro caractere de uma sentença
//! - `I`: Inside, caracteres seguintes da mesma sentença
//! - `O`: Outside, fora de qualquer sentença (espaços entre sentenças, cabeçalhos vazios)
//!
//! ## Modos
//!
//! - **Treino**: o rótulo de referência de cada posição vem das sentenças ouro,
//!   percorridas por um cursor que só avança ([`GoldCursor`]). O par
//!   `(rótulo, features)` é enviado ao classificador externo e o rótulo
//!   **correto** alimenta a próxima posição.
//! - **Inferência**: o classificador prevê cada rótulo; a previsão alimenta a
//!   próxima posição (label-feedback) e a máquina de estados de
//!   [`crate::span`] reconstrói as sentenças.
//!
//! O estado (rótulo anterior, início do span) é reiniciado em cada segmento.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{Classifier, InstanceSink, Instance, StateExposing};
use crate::document::{Document, Span};
use crate::error::{Result, SentenceError};
use crate::features::{extract_for_position, FeatureConfig, FeatureContext, FeatureSet};
use crate::span::DecodeState;

/// Rótulo BIO de um caractere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// **Outside**: fora de qualquer sentença.
    #[serde(rename = "O")]
    Outside,
    /// **Begin**: primeiro caractere de uma sentença.
    #[serde(rename = "B")]
    Begin,
    /// **Inside**: continuação de uma sentença.
    #[serde(rename = "I")]
    Inside,
}

impl Label {
    /// Número total de rótulos.
    pub const COUNT: usize = 3;

    /// Todos os rótulos, na ordem de [`Label::index`].
    pub const ALL: [Label; Label::COUNT] = [Label::Outside, Label::Begin, Label::Inside];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Outside => "O",
            Label::Begin => "B",
            Label::Inside => "I",
        }
    }

    /// Índice numérico para vetores de pesos.
    pub fn index(&self) -> usize {
        match self {
            Label::Outside => 0,
            Label::Begin => 1,
            Label::Inside => 2,
        }
    }

    /// `B` ou `I`.
    pub fn is_inside(&self) -> bool {
        !matches!(self, Label::Outside)
    }

    /// Verifica se a transição `prev → next` é válida: `I` nunca segue `O`.
    pub fn is_valid_transition(prev: Label, next: Label) -> bool {
        !(prev == Label::Outside && next == Label::Inside)
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "O" => Some(Label::Outside),
            "B" => Some(Label::Begin),
            "I" => Some(Label::Inside),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cursor sobre as sentenças ouro de um segmento.
///
/// Avança apenas para a frente: uma sentença é descartada quando a posição
/// corrente passa do seu fim. Quando não há mais sentenças, todo rótulo é `O`
/// (nenhum elemento sentinela é presumido).
#[derive(Debug, Clone)]
pub struct GoldCursor<'a> {
    segment: Span,
    spans: &'a [Span],
    next: usize,
}

impl<'a> GoldCursor<'a> {
    pub fn new(segment: Span, spans: &'a [Span]) -> Self {
        Self {
            segment,
            spans,
            next: 0,
        }
    }

    /// Nenhuma sentença resta à frente.
    pub fn is_exhausted(&self) -> bool {
        self.next >= self.spans.len()
    }

    /// Sentença corrente (que contém `pos` ou começa depois dela).
    fn current(&mut self, pos: usize) -> Result<Option<Span>> {
        while let Some(&span) = self.spans.get(self.next) {
            if span.end > pos {
                break;
            }
            self.check_successor(self.next)?;
            self.next += 1;
        }
        Ok(self.spans.get(self.next).copied())
    }

    fn check_successor(&self, index: usize) -> Result<()> {
        if let (Some(&previous), Some(&span)) = (self.spans.get(index), self.spans.get(index + 1)) {
            if span.begin < previous.end {
                return Err(SentenceError::GoldOrder {
                    segment: self.segment,
                    previous,
                    span,
                });
            }
        }
        Ok(())
    }

    /// Rótulo de referência da posição absoluta `pos`.
    ///
    /// `O` antes da próxima sentença (ou sem sentenças restantes), `B` ao
    /// entrar em uma sentença, `I` no restante dela.
    pub fn reference_label(&mut self, pos: usize) -> Result<Label> {
        let label = match self.current(pos)? {
            None => Label::Outside,
            Some(span) if pos < span.begin => Label::Outside,
            Some(span) if pos == span.begin => Label::Begin,
            Some(_) => Label::Inside,
        };
        Ok(label)
    }

    /// Valida a ordem das sentenças que o cursor não chegou a ultrapassar.
    pub fn finish(&self) -> Result<()> {
        for index in self.next..self.spans.len() {
            self.check_successor(index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    /// Em inferência, dentro de uma sentença, caracteres alfanuméricos viram
    /// `I` sem consultar o classificador.
    pub continue_inside_words: bool,
}

/// Resultado da decodificação de um segmento.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDecoding {
    /// Rótulos efetivos, já corrigidos.
    pub labels: Vec<Label>,
    pub spans: Vec<Span>,
    /// Quantas previsões `I` após `O` foram corrigidas para `B`.
    pub coercions: usize,
}

/// Tagger sequencial. Não guarda estado entre chamadas: é reentrante entre
/// documentos e segmentos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTagger {
    features: FeatureConfig,
    config: TaggerConfig,
}

impl SequenceTagger {
    pub fn new(features: FeatureConfig) -> Self {
        Self {
            features,
            config: TaggerConfig::default(),
        }
    }

    pub fn with_config(features: FeatureConfig, config: TaggerConfig) -> Self {
        Self { features, config }
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    /// Gera as instâncias de treino de um segmento e devolve os rótulos de referência.
    pub fn train_segment(
        &self,
        doc: &Document,
        segment: Span,
        sink: &mut dyn InstanceSink,
        mut recurrent: Option<&mut (dyn StateExposing + '_)>,
    ) -> Result<Vec<Label>> {
        let golds = doc.sentences_in(segment);
        let mut cursor = GoldCursor::new(segment, &golds);
        let text = doc.segment_chars(segment);
        let mut labels = Vec::with_capacity(text.len());
        let mut previous = Label::Outside;

        prime(&mut recurrent)?;
        for ind in 0..text.len() {
            let label = cursor.reference_label(segment.begin + ind)?;
            let features = self.position_features(text, ind, previous, &mut recurrent)?;
            sink.write(Instance { label, features })?;
            labels.push(label);
            previous = label;
        }
        cursor.finish()?;
        Ok(labels)
    }

    /// Gera as instâncias de treino de todos os segmentos do documento.
    pub fn train_document(
        &self,
        doc: &Document,
        sink: &mut dyn InstanceSink,
        mut recurrent: Option<&mut (dyn StateExposing + '_)>,
    ) -> Result<()> {
        debug!(document = doc.id(), "Gerando instâncias de treino");
        for &segment in doc.segments() {
            self.train_segment(doc, segment, sink, recurrent.as_deref_mut())
                .map_err(|e| e.in_document(doc.id()))?;
        }
        Ok(())
    }

    /// Decodifica um segmento com o classificador, aplicando label-feedback.
    pub fn decode_segment<C: Classifier + ?Sized>(
        &self,
        doc: &Document,
        segment: Span,
        classifier: &C,
        mut recurrent: Option<&mut (dyn StateExposing + '_)>,
    ) -> Result<SegmentDecoding> {
        let text = doc.segment_chars(segment);
        let mut state = DecodeState::new();
        let mut decoding = SegmentDecoding {
            labels: Vec::with_capacity(text.len()),
            ..SegmentDecoding::default()
        };

        prime(&mut recurrent)?;
        for (ind, &ch) in text.iter().enumerate() {
            let predicted = if self.config.continue_inside_words
                && state.previous.is_inside()
                && ch.is_alphanumeric()
            {
                // o modelo recorrente ainda precisa ver o caractere
                if let Some(r) = recurrent.as_mut() {
                    r.step_and_get_state(ch)?;
                }
                Label::Inside
            } else {
                let features = self.position_features(text, ind, state.previous, &mut recurrent)?;
                classifier.classify(&features)?
            };

            let (next, step) = state.step(predicted, segment.begin + ind, doc.chars());
            if step.coerced {
                decoding.coercions += 1;
            }
            decoding.labels.push(step.label);
            decoding.spans.extend(step.closed);
            state = next;
        }
        decoding.spans.extend(state.finish(segment.end, doc.chars()));
        Ok(decoding)
    }

    /// Detecta as sentenças de todos os segmentos do documento.
    pub fn decode_document<C: Classifier + ?Sized>(
        &self,
        doc: &Document,
        classifier: &C,
        mut recurrent: Option<&mut (dyn StateExposing + '_)>,
    ) -> Result<Vec<Span>> {
        debug!(document = doc.id(), "Decodificando documento");
        let mut spans = Vec::new();
        for &segment in doc.segments() {
            let decoding = self
                .decode_segment(doc, segment, classifier, recurrent.as_deref_mut())
                .map_err(|e| e.in_document(doc.id()))?;
            spans.extend(decoding.spans);
        }
        Ok(spans)
    }

    /// Avança o modelo recorrente (se houver) e extrai as features da posição.
    fn position_features(
        &self,
        text: &[char],
        ind: usize,
        previous: Label,
        recurrent: &mut Option<&mut (dyn StateExposing + '_)>,
    ) -> Result<FeatureSet> {
        let activations = match recurrent.as_mut() {
            Some(r) => Some(r.step_and_get_state(text[ind])?),
            None => None,
        };
        let ctx = FeatureContext {
            text,
            index: ind,
            previous,
            activations: activations.as_ref(),
        };
        Ok(extract_for_position(&self.features, &ctx))
    }
}

/// Reinicia o modelo recorrente e o alimenta com um espaço, como no início de um texto.
fn prime(recurrent: &mut Option<&mut (dyn StateExposing + '_)>) -> Result<()> {
    if let Some(r) = recurrent.as_mut() {
        r.reset();
        r.step_and_get_state(' ')?;
    }
    Ok(())
}
