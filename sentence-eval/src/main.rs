//! Avaliação do detector de sentenças por validação cruzada
//!
//! Sem argumentos, avalia o backend padrão sobre o corpus clínico de
//! demonstração. `RUST_LOG=sentence_core=debug` mostra os diagnósticos
//! DROPPED/ADDED de cada documento.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sentence_core::{
    corpus::{demo_corpus, load_corpus, render_token_frequencies, token_frequencies},
    pipeline::{evaluator_from_config, DetectorModel, SentenceDetector},
    Backend, DetectorConfig, Document, FeaturePreset,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sentence-eval")]
#[command(about = "Validação cruzada do detector de sentenças clínicas")]
#[command(version)]
struct Args {
    /// Configuração JSON (padrões embutidos se omitida)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Corpus JSON: arquivo com lista de documentos ou diretório com um `.json` por documento
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// Corpus de teste separado: treina no corpus inteiro e avalia neste, sem validação cruzada
    #[arg(long)]
    test: Option<PathBuf>,

    /// Backend do classificador (perceptron, maxent, baseline)
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Preset de features (char, shape, line_pos, char_shape, char_pos, char_shape_pos, recurrent)
    #[arg(short, long)]
    preset: Option<FeaturePreset>,

    /// Número de folds
    #[arg(short = 'k', long)]
    folds: Option<usize>,

    /// Executa os folds em paralelo
    #[arg(long)]
    parallel: bool,

    /// Remove a pontuação final das sentenças previstas antes de comparar
    #[arg(long)]
    strip_punctuation: bool,

    /// Após a avaliação, treina no corpus inteiro e grava o detector neste arquivo
    #[arg(long)]
    build_model: Option<PathBuf>,

    /// Imprime a configuração efetiva em JSON e sai
    #[arg(long)]
    print_config: bool,

    /// Grava a frequência dos tokens das sentenças ouro neste arquivo
    #[arg(long)]
    token_frequencies: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }
    let docs = read_corpus(args.corpus.as_ref())?;
    info!(
        backend = %config.backend,
        preset = config.features.preset.as_str(),
        documents = docs.len(),
        "Iniciando avaliação"
    );

    if let Some(path) = &args.token_frequencies {
        let counts = token_frequencies(&docs);
        std::fs::write(path, render_token_frequencies(&counts))
            .with_context(|| format!("gravando {}", path.display()))?;
        info!(tokens = counts.len(), path = %path.display(), "Frequências gravadas");
    }

    let evaluator = evaluator_from_config(&config)?;
    match &args.test {
        Some(test_path) => {
            let test_docs = read_corpus(Some(test_path))?;
            let report = evaluator.train_and_test(&docs, &test_docs)?;
            println!("{report}");
        }
        None => {
            let report = evaluator.cross_validate(&docs)?;
            println!("{report}");
        }
    }

    if let Some(path) = &args.build_model {
        let (model, report) = evaluator.train_and_evaluate_all(&docs)?;
        println!("Treino e teste no corpus inteiro");
        println!("{}", report.stats);
        let detector = SentenceDetector::from_model(DetectorModel {
            features: config.features,
            tagger: config.tagger,
            reservoir: config.reservoir_config(),
            model,
        })?;
        detector
            .save(path)
            .with_context(|| format!("gravando o modelo em {}", path.display()))?;
        info!(path = %path.display(), "Modelo gravado");
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("lendo a configuração {}", path.display()))?,
        None => DetectorConfig::default(),
    };
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(preset) = args.preset {
        config.features.preset = preset;
    }
    if let Some(folds) = args.folds {
        config.evaluation.folds = folds;
    }
    config.evaluation.parallel |= args.parallel;
    config.evaluation.strip_final_punctuation |= args.strip_punctuation;
    config.validate()?;
    Ok(config)
}

fn read_corpus(path: Option<&PathBuf>) -> Result<Vec<Document>> {
    match path {
        Some(path) => {
            load_corpus(path).with_context(|| format!("lendo o corpus {}", path.display()))
        }
        None => Ok(demo_corpus()?),
    }
}
