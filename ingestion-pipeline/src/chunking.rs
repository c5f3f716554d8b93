use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use common::error::AppError;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_OVERLAP: usize = 200;

lazy_static! {
    /// Legal-sentence boundary: terminator plus whitespace, followed by an
    /// uppercase letter (including Portuguese accented capitals), a digit or
    /// an opening quote.
    static ref SENTENCE_BOUNDARY: Regex = Regex::new(
        "[.!?;]\\s+([\"'“”‘’A-ZÁÀÂÃÄÇÉÈÊËÍÌÎÏÓÒÔÕÖÚÙÛÜ0-9])"
    )
    .expect("sentence boundary regex must compile");
}

/// One chunk of normalized text plus its positional metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub index: usize,
    pub metadata: Map<String, Value>,
}

/// Collapse whitespace, split on legal-sentence boundaries and greedily pack
/// sentences into chunks of at most `chunk_size` characters, carrying a
/// trailing-word overlap of at least `overlap` characters between chunks.
pub fn chunk_text(
    text: &str,
    metadata: &Map<String, Value>,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, AppError> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Err(AppError::Validation("Cannot chunk empty text".into()));
    }

    // Single-chunk fast path.
    if normalized.len() <= chunk_size {
        return Ok(vec![make_chunk(normalized, 0, metadata)]);
    }

    let sentences = split_sentences(&normalized);

    let mut texts: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        if current.is_empty() {
            current = sentence;
            continue;
        }

        if current.len() + 1 + sentence.len() <= chunk_size {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            let suffix = overlap_suffix(&current, overlap);
            texts.push(std::mem::take(&mut current));
            current = if suffix.is_empty() {
                sentence
            } else {
                format!("{suffix} {sentence}")
            };
        }
    }

    if !current.trim().is_empty() {
        texts.push(current);
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| make_chunk(text, index, metadata))
        .collect())
}

fn make_chunk(text: String, index: usize, metadata: &Map<String, Value>) -> Chunk {
    let mut chunk_metadata = metadata.clone();
    chunk_metadata.insert("chunk_index".to_string(), Value::from(index));
    Chunk {
        text,
        index,
        metadata: chunk_metadata,
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for caps in SENTENCE_BOUNDARY.captures_iter(text) {
        if let Some(next_start) = caps.get(1) {
            let sentence = text[start..next_start.start()].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = next_start.start();
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Trailing whitespace-delimited words of `text`, re-included from the end
/// until their joined length is at least `overlap`.
fn overlap_suffix(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }

    let mut taken: Vec<&str> = Vec::new();
    let mut length = 0;
    for word in text.split_whitespace().rev() {
        if length >= overlap {
            break;
        }
        length += word.len() + usize::from(length > 0);
        taken.push(word);
    }

    taken.reverse();
    taken.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("processo".into(), Value::from("REsp 1/SP"));
        m
    }

    #[test]
    fn rejects_empty_and_whitespace_only_text() {
        assert!(chunk_text("", &Map::new(), 500, 100).is_err());
        assert!(chunk_text("   \n\t  ", &Map::new(), 500, 100).is_err());
    }

    #[test]
    fn single_chunk_fast_path() {
        let chunks = chunk_text("Uma frase curta.", &meta(), 500, 100).expect("chunk");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Uma frase curta.");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].metadata["chunk_index"], 0);
        assert_eq!(chunks[0].metadata["processo"], "REsp 1/SP");
    }

    #[test]
    fn whitespace_is_collapsed() {
        let chunks = chunk_text("Primeira   frase.\n\nSegunda\tfrase.", &Map::new(), 500, 100)
            .expect("chunk");
        assert_eq!(chunks[0].text, "Primeira frase. Segunda frase.");
    }

    #[test]
    fn repeated_sentences_pack_within_bounds() {
        // Matches the seed scenario: 200 short sentences, chunk 500, overlap 100.
        let text = "Frase um. ".repeat(200);
        let chunks = chunk_text(&text, &Map::new(), 500, 100).expect("chunk");

        assert!(chunks.len() > 1, "2000 chars must not fit one 500-char chunk");
        for chunk in &chunks {
            assert!(
                chunk.text.len() <= 600,
                "chunk of {} chars exceeds chunk_size + overlap",
                chunk.text.len()
            );
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i, "indices must be sequential from 0");
            assert_eq!(chunk.metadata["chunk_index"], i);
        }
    }

    #[test]
    fn consecutive_chunks_share_an_overlap() {
        let text = "Frase um. ".repeat(200);
        let chunks = chunk_text(&text, &Map::new(), 500, 100).expect("chunk");

        for pair in chunks.windows(2) {
            let overlap = overlap_suffix(&pair[0].text, 100);
            assert!(overlap.len() >= 100);
            assert!(
                pair[1].text.starts_with(&overlap),
                "next chunk must start with the previous chunk's overlap"
            );
        }
    }

    #[test]
    fn rejoining_chunks_reconstructs_the_normalized_text() {
        let text = "Frase um. ".repeat(200);
        let normalized = normalize_whitespace(&text);
        let chunks = chunk_text(&text, &Map::new(), 500, 100).expect("chunk");

        let mut rebuilt = chunks[0].text.clone();
        for pair in chunks.windows(2) {
            let overlap = overlap_suffix(&pair[0].text, 100);
            let continuation = pair[1]
                .text
                .strip_prefix(&overlap)
                .expect("overlap prefix")
                .trim_start();
            rebuilt.push(' ');
            rebuilt.push_str(continuation);
        }

        assert!(
            rebuilt.contains(&normalized) || normalized.contains(&rebuilt),
            "stripped rejoin must reconstruct the normalized text"
        );
    }

    #[test]
    fn splits_on_portuguese_accented_capitals_and_digits() {
        let sentences = split_sentences("O réu foi condenado. Órgão julgador confirmou. 3 votos vencidos.");
        assert_eq!(
            sentences,
            vec![
                "O réu foi condenado.",
                "Órgão julgador confirmou.",
                "3 votos vencidos."
            ]
        );
    }

    #[test]
    fn does_not_split_before_lowercase() {
        let sentences = split_sentences("Recurso do art. citado na inicial. Outra frase.");
        assert_eq!(
            sentences,
            vec!["Recurso do art. citado na inicial.", "Outra frase."]
        );
    }

    #[test]
    fn splits_before_digits() {
        let sentences = split_sentences("Vide art. 105 da Constituição.");
        assert_eq!(sentences, vec!["Vide art.", "105 da Constituição."]);
    }

    #[test]
    fn splits_after_semicolon_and_question_mark() {
        let sentences = split_sentences("Primeiro ponto; Segundo ponto! Houve dolo? Sim.");
        assert_eq!(sentences.len(), 4);
    }

    #[test]
    fn overlap_suffix_reaches_requested_length() {
        let text = "um dois tres quatro cinco seis sete oito";
        let suffix = overlap_suffix(text, 10);
        assert!(suffix.len() >= 10);
        assert!(text.ends_with(&suffix));

        assert_eq!(overlap_suffix(text, 0), "");
    }

    #[test]
    fn oversized_single_sentence_becomes_its_own_chunk() {
        let long_sentence = format!("{}.", "palavra ".repeat(100).trim());
        let text = format!("Curta um. {long_sentence} Curta dois.");
        let chunks = chunk_text(&text, &Map::new(), 50, 10).expect("chunk");

        assert!(chunks.iter().any(|c| c.text.len() > 50));
        assert!(chunks.iter().any(|c| c.text.contains("Curta dois.")));
    }
}
