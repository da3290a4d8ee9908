//! # Corpus Clínico e Provedor de Anotações
//!
//! - **Corpus de demonstração**: notas clínicas curtas em português, montadas a
//!   partir de listas de sentenças. Os offsets das sentenças e dos segmentos
//!   são calculados na montagem, nunca escritos à mão.
//! - **Corpus JSON**: documentos `{id, text, segments, sentences}` com offsets
//!   absolutos em caracteres, lidos de um arquivo (lista) ou de um diretório
//!   (um documento por arquivo `.json`).
//! - **Frequência de tokens**: contagem dos tokens das sentenças ouro.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::{AnnotationProvider, Document, GoldAnnotation, Span};
use crate::error::{Result, SentenceError};

/// Separador entre sentenças de um mesmo parágrafo.
const SENTENCE_SEPARATOR: &str = " ";
/// Separador entre parágrafos (cada parágrafo é um segmento).
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Monta um documento anotado a partir de parágrafos de sentenças.
///
/// Cada parágrafo vira um segmento; sentenças vazias são ignoradas.
pub fn build_document(id: &str, paragraphs: &[&[&str]]) -> Result<Document> {
    let mut text = String::new();
    let mut offset = 0usize;
    let mut gold = GoldAnnotation::default();

    for (p, paragraph) in paragraphs.iter().enumerate() {
        if p > 0 {
            text.push_str(PARAGRAPH_SEPARATOR);
            offset += PARAGRAPH_SEPARATOR.chars().count();
        }
        let segment_begin = offset;
        let sentences = paragraph.iter().filter(|s| !s.is_empty());
        for (s, sentence) in sentences.enumerate() {
            if s > 0 {
                text.push_str(SENTENCE_SEPARATOR);
                offset += SENTENCE_SEPARATOR.chars().count();
            }
            let len = sentence.chars().count();
            gold.sentences.push(Span::new(offset, offset + len));
            text.push_str(sentence);
            offset += len;
        }
        if offset > segment_begin {
            gold.segments.push(Span::new(segment_begin, offset));
        }
    }

    Document::with_annotation(id, text, gold)
}

/// Notas clínicas de demonstração.
const DEMO_NOTES: &[(&str, &[&[&str]])] = &[
    (
        "nota-001",
        &[
            &["QUEIXA PRINCIPAL:", "Dor torácica há 2 dias."],
            &[
                "Paciente de 54 anos, hipertenso, refere dor em aperto.",
                "Nega dispneia.",
                "Encaminhado pelo Dr. Souza da UBS.",
            ],
            &["PA 150/90 mmHg.", "FC 88 bpm."],
        ],
    ),
    (
        "nota-002",
        &[
            &["Evolução clínica"],
            &[
                "Paciente estável, afebril, aceitando dieta.",
                "Sem queixas álgicas no momento.",
                "Mantida antibioticoterapia com ceftriaxona 1 g 12/12h.",
            ],
        ],
    ),
    (
        "nota-003",
        &[
            &["HISTÓRIA DA DOENÇA ATUAL:"],
            &[
                "Refere tosse produtiva há uma semana.",
                "Febre aferida de 38,5 °C.",
                "Procurou o pronto-socorro?",
                "Sim, há 3 dias.",
            ],
            &["Conduta: solicitado raio-X de tórax."],
        ],
    ),
    (
        "nota-004",
        &[
            &[
                "Paciente trazida pela Sra. Lima, filha.",
                "Queda da própria altura em domicílio.",
                "Nega perda de consciência!",
            ],
            &["Ao exame: hematoma em região frontal.", "Glasgow 15."],
        ],
    ),
    (
        "nota-005",
        &[
            &["PLANO"],
            &[
                "Alta hospitalar amanhã.",
                "Retorno ambulatorial em 15 dias com a Dra. Nunes.",
                "Orientado quanto a sinais de alarme.",
            ],
        ],
    ),
    (
        "nota-006",
        &[
            &["Medicações em uso:", "losartana 50 mg 1x/dia.", "metformina 850 mg 2x/dia."],
            &["Alergias: nega."],
        ],
    ),
    (
        "nota-007",
        &[
            &["EXAME FÍSICO:"],
            &[
                "BEG, corado, hidratado.",
                "AC: RCR 2T BNF sem sopros.",
                "AR: MV presente bilateralmente, sem ruídos adventícios.",
            ],
            &["Abdome flácido, indolor à palpação."],
        ],
    ),
    (
        "nota-008",
        &[
            &[
                "Paciente relata melhora parcial da dor lombar.",
                "Fez uso de dipirona, aprox. 4 doses ao dia.",
                "Deambula sem auxílio.",
            ],
            &["Mantido tratamento conservador.", "Reavaliar em 7 dias."],
        ],
    ),
    (
        "nota-009",
        &[
            &["IMPRESSÃO DIAGNÓSTICA"],
            &["Pneumonia adquirida na comunidade.", "Descartar tuberculose."],
            &["Solicitada baciloscopia de escarro (2 amostras)."],
        ],
    ),
    (
        "nota-010",
        &[
            &[
                "Gestante de 28 semanas, G2P1.",
                "Movimentos fetais presentes.",
                "Nega perdas vaginais.",
                "BCF 140 bpm.",
            ],
        ],
    ),
    (
        "nota-011",
        &[
            &["Resultado de exames"],
            &[
                "Hb 10,2 g/dL; leucócitos 12.400/mm3.",
                "PCR elevada.",
                "Função renal preservada.",
            ],
            &["Discutido com o Dr. Alves, da infectologia."],
        ],
    ),
    (
        "nota-012",
        &[
            &["Paciente orientado, colaborativo.", "Sono preservado?", "Refere insônia inicial."],
            &["Iniciado acompanhamento com psicologia.", "Retorno em 30 dias."],
        ],
    ),
];

/// Corpus de demonstração com anotação ouro completa.
pub fn demo_corpus() -> Result<Vec<Document>> {
    DEMO_NOTES
        .iter()
        .map(|(id, paragraphs)| build_document(id, paragraphs))
        .collect()
}

/// Um documento como gravado em disco.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Span>,
    #[serde(default)]
    pub sentences: Vec<Span>,
}

impl DocumentRecord {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id().to_string(),
            text: doc.text().to_string(),
            segments: doc.segments().to_vec(),
            sentences: doc.gold_sentences().to_vec(),
        }
    }

    pub fn into_document(self) -> Result<Document> {
        let gold = GoldAnnotation {
            segments: self.segments,
            sentences: self.sentences,
        };
        Document::with_annotation(self.id, self.text, gold)
    }
}

/// Corpus lido de JSON; também serve de provedor de anotações por id.
#[derive(Debug, Clone, Default)]
pub struct JsonCorpus {
    records: Vec<DocumentRecord>,
}

impl JsonCorpus {
    pub fn from_records(records: Vec<DocumentRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let records = serde_json::from_str(json)
            .map_err(|e| SentenceError::json("parsing corpus", e))?;
        Ok(Self { records })
    }

    /// Lê um arquivo com uma lista de documentos, ou um diretório com um
    /// documento por arquivo `.json` (em ordem alfabética de nome).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            let json = fs::read_to_string(path)
                .map_err(|e| SentenceError::io("reading corpus file", e))?;
            return Self::from_json(&json);
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| SentenceError::io("listing corpus directory", e))? {
            let file = entry
                .map_err(|e| SentenceError::io("listing corpus directory", e))?
                .path();
            if file.extension().is_some_and(|ext| ext == "json") {
                files.push(file);
            }
        }
        files.sort();

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let json = fs::read_to_string(&file)
                .map_err(|e| SentenceError::io("reading corpus document", e))?;
            let record = serde_json::from_str(&json)
                .map_err(|e| SentenceError::json("parsing corpus document", e))?;
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Identificadores dos documentos, na ordem de leitura.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Converte todos os registros em documentos validados.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let docs: Vec<Document> = self
            .records
            .iter()
            .cloned()
            .map(DocumentRecord::into_document)
            .collect::<Result<_>>()?;
        let sentences: usize = docs.iter().map(|d| d.gold_sentences().len()).sum();
        info!(documents = docs.len(), sentences, "Corpus carregado");
        Ok(docs)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.records)
            .map_err(|e| SentenceError::json("serializing corpus", e))
    }
}

impl AnnotationProvider for JsonCorpus {
    fn annotate(&self, document_id: &str) -> Result<GoldAnnotation> {
        let record = self
            .records
            .iter()
            .find(|r| r.id == document_id)
            .ok_or_else(|| SentenceError::UnknownDocument {
                id: document_id.to_string(),
            })?;
        Ok(GoldAnnotation {
            segments: record.segments.clone(),
            sentences: record.sentences.clone(),
        })
    }
}

/// Carrega um corpus JSON (arquivo ou diretório) como documentos.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    JsonCorpus::load(path)?.documents()
}

fn trailing_punct() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\p{L}+[[:punct:]]$").expect("valid token regex"))
}

/// Frequência dos tokens (delimitados por espaço) das sentenças ouro.
///
/// Tokens formados por letras seguidas de um único sinal de pontuação
/// (`febre.`, `Dor,`) são contados sem a pontuação.
pub fn token_frequencies(docs: &[Document]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for doc in docs {
        for &segment in doc.segments() {
            for sentence in doc.sentences_in(segment) {
                let covered = doc.covered_text(sentence);
                for token in covered.split_whitespace() {
                    let token = if trailing_punct().is_match(token) {
                        let cut = token.char_indices().last().map_or(0, |(i, _)| i);
                        &token[..cut]
                    } else {
                        token
                    };
                    if !token.is_empty() {
                        *counts.entry(token.to_string()).or_insert(0) += 1;
                    }
                }
            }
        }
    }
    counts
}

/// Uma linha `token : contagem` por token.
pub fn render_token_frequencies(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(token, count)| format!("{token} : {count}\n"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_document_computes_offsets() {
        let doc = build_document("d", &[&["Um.", "Dois."], &["Três."]]).unwrap();
        assert_eq!(doc.text(), "Um. Dois.\n\nTrês.");
        assert_eq!(doc.segments(), &[Span::new(0, 9), Span::new(11, 16)]);
        assert_eq!(
            doc.gold_sentences(),
            &[Span::new(0, 3), Span::new(4, 9), Span::new(11, 16)]
        );
        assert_eq!(doc.covered_text(Span::new(11, 16)), "Três.");
    }

    #[test]
    fn test_demo_corpus_is_valid() {
        let docs = demo_corpus().unwrap();
        assert_eq!(docs.len(), DEMO_NOTES.len());
        for doc in &docs {
            assert!(!doc.gold_sentences().is_empty());
            for &s in doc.gold_sentences() {
                let text = doc.covered_text(s);
                assert_eq!(text.trim(), text, "sentença com espaços nas bordas em {}", doc.id());
            }
        }
    }

    #[test]
    fn test_json_round_trip_through_provider() {
        let docs = demo_corpus().unwrap();
        let records = docs.iter().map(DocumentRecord::from_document).collect();
        let corpus = JsonCorpus::from_records(records);
        let reloaded = JsonCorpus::from_json(&corpus.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.ids(), corpus.ids());

        let gold = reloaded.annotate("nota-003").unwrap();
        assert_eq!(gold.sentences, docs[2].gold_sentences());
        assert!(reloaded.annotate("inexistente").is_err());
    }

    #[test]
    fn test_record_without_segments_is_single_segment() {
        let json = r#"[{"id": "a", "text": "Sem febre. Alta.", "sentences": [{"begin": 0, "end": 10}, {"begin": 11, "end": 16}]}]"#;
        let docs = JsonCorpus::from_json(json).unwrap().documents().unwrap();
        assert_eq!(docs[0].segments(), &[Span::new(0, 16)]);
    }

    #[test]
    fn test_load_directory_one_document_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let docs = demo_corpus().unwrap();
        // gravados fora de ordem; a leitura segue o nome do arquivo
        for (name, doc) in [("b.json", &docs[1]), ("a.json", &docs[0])] {
            let json = serde_json::to_string(&DocumentRecord::from_document(doc)).unwrap();
            fs::write(dir.path().join(name), json).unwrap();
        }
        fs::write(dir.path().join("notas.txt"), "ignorado").unwrap();

        let loaded = load_corpus(dir.path()).unwrap();
        let ids: Vec<&str> = loaded.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["nota-001", "nota-002"]);
        assert_eq!(loaded[1].gold_sentences(), docs[1].gold_sentences());
    }

    #[test]
    fn test_missing_corpus_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_corpus(&dir.path().join("inexistente.json")).unwrap_err();
        assert!(matches!(err, SentenceError::Io { .. }));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = JsonCorpus::from_json("{not json").unwrap_err();
        assert!(matches!(err, SentenceError::Json { .. }));
    }

    #[test]
    fn test_token_frequencies_strip_trailing_punctuation() {
        let doc = build_document("d", &[&["Sem febre.", "Febre alta, tosse."], &["Dr. Souza: febre."]]).unwrap();
        let counts = token_frequencies(&[doc]);
        assert_eq!(counts["febre"], 2);
        assert_eq!(counts["Febre"], 1);
        assert_eq!(counts["alta"], 1);
        assert_eq!(counts["Dr"], 1);
        assert_eq!(counts["Souza"], 1);
        assert!(render_token_frequencies(&counts).contains("tosse : 1\n"));
    }
}
