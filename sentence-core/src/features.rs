//! # Engenharia de Features por Caractere
//!
//! Para cada posição `ind` de um segmento, extrai um conjunto nomeado de
//! features que o classificador usa para decidir entre `O`, `B` e `I`.
//! A extração é uma **função pura** das entradas: treino e inferência usam
//! exatamente a mesma lógica, mudando apenas a origem do rótulo anterior.
//!
//! ## Famílias de Features
//!
//! ### Rótulo anterior (label-feedback)
//! - `prev_outcome=O|B|I`: o rótulo atribuído em `ind-1` (`O` no início do segmento).
//!
//! ### Caracteres (janela simétrica `[-W, +W]`, padrão `W=3`)
//! - Identidade (`_type`, com `\n` como `<LF>`), maiúscula, minúscula, dígito,
//!   espaço e categoria Unicode geral (`Lu`, `Ll`, `Po`, ...).
//! - Cada offset tem o seu prefixo (`char[-2]`, `char[+1]`), então nomes nunca colidem.
//!
//! ### Contexto de tokens (delimitados por espaço)
//! - Próximo token e token anterior: identidade, comprimento, capitalização
//!   inicial e "forma" (`Hello` → `LuLl+`).
//!
//! ### Posição na linha
//! - Posição relativa dentro da linha corrente, início e fim de linha.
//!
//! ### Estado recorrente
//! - Ativações e memória de um modelo recorrente (`rnn_act_{i}`, `rnn_mem_{i}`),
//!   avançado pelo tagger antes da extração.
//!
//! Leituras fora do segmento são simplesmente ignoradas: as features de janela
//! ficam esparsas nas bordas.

use std::sync::OnceLock;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::classifier::Activations;
use crate::error::SentenceError;
use crate::tagger::Label;

/// Valor tipado de uma feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    Bool(bool),
    Category(String),
    /// Inteiro discreto (ex: comprimento de token); codificado como categoria.
    Number(i64),
    /// Valor contínuo (ex: ativação de uma rede recorrente).
    Real(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: FeatureValue,
}

/// Conjunto ordenado de features de uma posição. Nomes são únicos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insere uma feature; um nome repetido substitui o valor anterior.
    pub fn insert(&mut self, name: impl Into<String>, value: FeatureValue) {
        let name = name.into();
        match self.features.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.value = value,
            None => self.features.push(Feature { name, value }),
        }
    }

    /// Acrescenta sem procurar o nome; o extrator gera nomes únicos por construção.
    pub(crate) fn push(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.features.push(Feature {
            name: name.into(),
            value,
        });
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Valor categórico de `name`, se houver.
    pub fn category(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(FeatureValue::Category(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// `true` apenas se `name` existe e é `Bool(true)`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(FeatureValue::Bool(true)))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Codificação esparsa para modelos lineares.
    ///
    /// - `Bool(true)` → `nome: 1.0` (`false` é omitido)
    /// - `Category(v)` e `Number(n)` → `nome=v: 1.0`
    /// - `Real(x)` → `nome: x` (NaN vira 0.0)
    ///
    /// Inclui sempre a feature constante `bias`. A ordem segue a do conjunto,
    /// o que torna os produtos escalares determinísticos.
    pub fn to_sparse(&self) -> SparseVector {
        let mut sv = SparseVector::with_capacity(self.features.len() + 1);
        sv.push("bias", 1.0);
        for f in &self.features {
            match &f.value {
                FeatureValue::Bool(true) => sv.push(f.name.clone(), 1.0),
                FeatureValue::Bool(false) => {}
                FeatureValue::Category(v) => sv.push(format!("{}={v}", f.name), 1.0),
                FeatureValue::Number(n) => sv.push(format!("{}={n}", f.name), 1.0),
                FeatureValue::Real(x) => {
                    let x = if x.is_nan() { 0.0 } else { *x };
                    sv.push(f.name.clone(), x)
                }
            }
        }
        sv
    }
}

/// Vetor esparso `(nome, valor)` consumido por Perceptron e MaxEnt.
///
/// Cada posição ativa apenas um pequeno subconjunto de um espaço de features
/// potencialmente infinito (ex: `char_type=a`, `next_token=Dr.`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub entries: Vec<(String, f64)>,
}

impl SparseVector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: f64) {
        self.entries.push((key.into(), value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Combinações pré-definidas de famílias de features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePreset {
    /// Apenas janela de caracteres.
    Char,
    /// Apenas contexto de tokens.
    Shape,
    /// Apenas posição na linha.
    LinePos,
    /// Caracteres + tokens (padrão).
    CharShape,
    /// Caracteres + posição na linha.
    CharPos,
    /// Todas as famílias léxicas.
    CharShapePos,
    /// Caracteres + tokens + estado de um modelo recorrente.
    Recurrent,
}

impl Default for FeaturePreset {
    fn default() -> Self {
        FeaturePreset::CharShape
    }
}

impl FeaturePreset {
    pub const ALL: [FeaturePreset; 7] = [
        FeaturePreset::Char,
        FeaturePreset::Shape,
        FeaturePreset::LinePos,
        FeaturePreset::CharShape,
        FeaturePreset::CharPos,
        FeaturePreset::CharShapePos,
        FeaturePreset::Recurrent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeaturePreset::Char => "char",
            FeaturePreset::Shape => "shape",
            FeaturePreset::LinePos => "line_pos",
            FeaturePreset::CharShape => "char_shape",
            FeaturePreset::CharPos => "char_pos",
            FeaturePreset::CharShapePos => "char_shape_pos",
            FeaturePreset::Recurrent => "recurrent",
        }
    }
}

impl std::str::FromStr for FeaturePreset {
    type Err = SentenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeaturePreset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SentenceError::invalid_config(format!("unknown feature preset `{s}`")))
    }
}

/// Famílias ativas, derivadas de um [`FeaturePreset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFamilies {
    pub prev_outcome: bool,
    pub characters: bool,
    pub token_context: bool,
    pub line_position: bool,
    pub recurrent: bool,
}

impl FeaturePreset {
    pub fn families(&self) -> FeatureFamilies {
        let (characters, token_context, line_position, recurrent) = match self {
            FeaturePreset::Char => (true, false, false, false),
            FeaturePreset::Shape => (false, true, false, false),
            FeaturePreset::LinePos => (false, false, true, false),
            FeaturePreset::CharShape => (true, true, false, false),
            FeaturePreset::CharPos => (true, false, true, false),
            FeaturePreset::CharShapePos => (true, true, true, false),
            FeaturePreset::Recurrent => (true, true, false, true),
        };
        FeatureFamilies {
            prev_outcome: true,
            characters,
            token_context,
            line_position,
            recurrent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub preset: FeaturePreset,
    /// Meia-largura `W` da janela de caracteres.
    pub window: usize,
}

impl FeatureConfig {
    pub const DEFAULT_WINDOW: usize = 3;

    pub fn new(preset: FeaturePreset) -> Self {
        Self {
            preset,
            window: Self::DEFAULT_WINDOW,
        }
    }

    pub fn families(&self) -> FeatureFamilies {
        self.preset.families()
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::new(FeaturePreset::default())
    }
}

/// Entradas da extração para uma posição.
#[derive(Debug, Clone, Copy)]
pub struct FeatureContext<'a> {
    /// Caracteres do segmento (offset 0 = início do segmento).
    pub text: &'a [char],
    pub index: usize,
    /// Rótulo em `index - 1`; `O` no início do segmento.
    pub previous: Label,
    /// Estado do modelo recorrente já avançado para `text[index]`.
    pub activations: Option<&'a Activations>,
}

/// Extrai as features da posição `ctx.index`.
pub fn extract_for_position(config: &FeatureConfig, ctx: &FeatureContext<'_>) -> FeatureSet {
    let families = config.families();
    let text = ctx.text;
    let ind = ctx.index;
    let mut fs = FeatureSet::new();

    if families.prev_outcome {
        fs.push(
            "prev_outcome",
            FeatureValue::Category(ctx.previous.as_str().to_string()),
        );
    }

    if families.characters {
        if let Some(&ch) = text.get(ind) {
            insert_char_features(&mut fs, ch, "char");
        }
        let window = config.window as isize;
        for offset in -window..=window {
            if offset == 0 {
                continue;
            }
            let pos = ind as isize + offset;
            if pos < 0 {
                continue;
            }
            if let Some(&ch) = text.get(pos as usize) {
                insert_char_features(&mut fs, ch, &format!("char[{offset:+}]"));
            }
        }
    }

    if families.token_context && ind < text.len() {
        insert_token_features(&mut fs, &text[next_token(text, ind)], "next_token");
        insert_token_features(&mut fs, &text[prev_token(text, ind)], "prev_token");
    }

    if families.line_position && ind < text.len() {
        insert_line_features(&mut fs, text, ind);
    }

    if families.recurrent {
        if let Some(acts) = ctx.activations {
            for (i, v) in acts.hidden.iter().enumerate() {
                fs.push(format!("rnn_act_{i}"), FeatureValue::Real(finite_or_zero(*v)));
            }
            for (i, v) in acts.memory.iter().enumerate() {
                fs.push(format!("rnn_mem_{i}"), FeatureValue::Real(finite_or_zero(*v)));
            }
        }
    }

    fs
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v
    }
}

fn insert_char_features(fs: &mut FeatureSet, ch: char, prefix: &str) {
    fs.push(format!("{prefix}_type"), FeatureValue::Category(char_symbol(ch)));
    fs.push(format!("{prefix}_upper"), FeatureValue::Bool(ch.is_uppercase()));
    fs.push(format!("{prefix}_lower"), FeatureValue::Bool(ch.is_lowercase()));
    fs.push(format!("{prefix}_digit"), FeatureValue::Bool(is_decimal_digit(ch)));
    fs.push(format!("{prefix}_space"), FeatureValue::Bool(ch.is_whitespace()));
    fs.push(
        format!("{prefix}_category"),
        FeatureValue::Category(general_category(ch).to_string()),
    );
}

/// Apenas dígitos decimais (`Nd`): `²`, `½` e numerais romanos não contam.
fn is_decimal_digit(ch: char) -> bool {
    ch.is_ascii_digit() || (!ch.is_ascii() && general_category(ch) == "Nd")
}

fn insert_token_features(fs: &mut FeatureSet, token: &[char], prefix: &str) {
    if token.is_empty() {
        return;
    }
    fs.push(prefix, FeatureValue::Category(token.iter().collect()));
    fs.push(format!("{prefix}_len"), FeatureValue::Number(token.len() as i64));
    fs.push(format!("{prefix}_cap"), FeatureValue::Bool(token[0].is_uppercase()));
    fs.push(format!("{prefix}_shape"), FeatureValue::Category(char_shape(token)));
}

fn insert_line_features(fs: &mut FeatureSet, text: &[char], ind: usize) {
    let line_start = text[..ind]
        .iter()
        .rposition(|&c| c == '\n')
        .map(|p| p + 1)
        .unwrap_or(0);
    let line_end = text[ind..]
        .iter()
        .position(|&c| c == '\n')
        .map(|p| ind + p)
        .unwrap_or(text.len());
    let width = line_end.saturating_sub(line_start).max(1);

    fs.push(
        "line_pos",
        FeatureValue::Real((ind - line_start) as f64 / width as f64),
    );
    fs.push("line_start", FeatureValue::Bool(ind == line_start));
    fs.push("line_end", FeatureValue::Bool(ind + 1 == line_end));
}

/// Símbolo de identidade do caractere; quebras de linha e tabs ganham nomes próprios.
fn char_symbol(ch: char) -> String {
    match ch {
        '\n' => "<LF>".to_string(),
        '\r' => "<CR>".to_string(),
        '\t' => "<TAB>".to_string(),
        ' ' => "<SP>".to_string(),
        other => other.to_string(),
    }
}

/// Intervalo (relativo) do token que contém `ind`; se `ind` é espaço, do
/// primeiro token à direita. Vazio quando só há espaços até o fim.
pub fn next_token(text: &[char], ind: usize) -> std::ops::Range<usize> {
    let mut start = ind.min(text.len());
    while start < text.len() && text[start].is_whitespace() {
        start += 1;
    }
    while start > 0 && start <= text.len() && !text[start - 1].is_whitespace() {
        start -= 1;
    }
    let mut end = start;
    while end < text.len() && !text[end].is_whitespace() {
        end += 1;
    }
    start..end
}

/// Intervalo do último token que termina antes do token de `ind`.
/// Vazio quando `ind` está no primeiro token do segmento.
pub fn prev_token(text: &[char], ind: usize) -> std::ops::Range<usize> {
    if text.is_empty() {
        return 0..0;
    }
    let mut cursor = ind.min(text.len() - 1);
    if !text[cursor].is_whitespace() {
        while cursor > 0 && !text[cursor - 1].is_whitespace() {
            cursor -= 1;
        }
    }
    while cursor > 0 && text[cursor - 1].is_whitespace() {
        cursor -= 1;
    }
    let end = cursor;
    let mut start = end;
    while start > 0 && !text[start - 1].is_whitespace() {
        start -= 1;
    }
    start..end
}

/// Forma do token: códigos de categoria Unicode com repetições colapsadas
/// em `+` (ex: `Hello` → `LuLl+`, `12.5mg` → `Nd+PoNdLl+`).
pub fn char_shape(token: &[char]) -> String {
    let mut runs: Vec<(&'static str, bool)> = Vec::new();
    for &ch in token {
        let cat = general_category(ch);
        match runs.last_mut() {
            Some((last, repeated)) if *last == cat => *repeated = true,
            _ => runs.push((cat, false)),
        }
    }
    runs.iter()
        .map(|(cat, repeated)| if *repeated { format!("{cat}+") } else { cat.to_string() })
        .collect()
}

const GENERAL_CATEGORIES: [&str; 28] = [
    "Lu", "Ll", "Lt", "Lm", "Lo", "Mn", "Mc", "Me", "Nd", "Nl", "No", "Pc", "Pd", "Ps", "Pe",
    "Pi", "Pf", "Po", "Sm", "Sc", "Sk", "So", "Zs", "Zl", "Zp", "Cc", "Cf", "Co",
];

fn category_set() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSet::new(GENERAL_CATEGORIES.iter().map(|c| format!(r"\A\p{{{c}}}\z")))
            .expect("general category patterns are valid")
    })
}

/// Categoria Unicode geral de `ch` (`Cn` quando não atribuída).
pub fn general_category(ch: char) -> &'static str {
    let mut buf = [0u8; 4];
    let s = ch.encode_utf8(&mut buf);
    category_set()
        .matches(s)
        .iter()
        .next()
        .map(|i| GENERAL_CATEGORIES[i])
        .unwrap_or("Cn")
}
