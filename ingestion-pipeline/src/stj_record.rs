use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Minimum length for the catch-all rule: remaining string fields longer than
/// this are appended to the canonical text.
const CATCH_ALL_MIN_CHARS: usize = 50;

/// A typed STJ decision record as published in the open-data JSON dumps.
/// Unknown fields are retained so the catch-all projection can inspect them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StjRecord {
    pub processo: Option<String>,
    pub classe: Option<String>,
    pub relator: Option<String>,
    pub orgao_julgador: Option<String>,
    pub data_julgamento: Option<String>,
    pub data_publicacao: Option<String>,
    pub ementa: Option<String>,
    pub decisao: Option<String>,
    pub acordao: Option<String>,
    /// Published either as a list of strings or a single string.
    pub referencias_legislativas: Option<Value>,
    pub palavras_chave: Option<Value>,
    pub tema: Option<String>,
    pub ramo: Option<String>,
    pub notas: Option<String>,
    pub informacoes_complementares: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Project a record into its canonical labeled text plus retrieval metadata.
/// Returns empty text when nothing projects.
pub fn from_stj_record(record: &StjRecord) -> (String, Map<String, Value>) {
    let mut sections: Vec<String> = Vec::new();

    labeled(&mut sections, "Processo", &record.processo);
    labeled(&mut sections, "Classe", &record.classe);
    labeled(&mut sections, "Relator", &record.relator);
    labeled(&mut sections, "Órgão Julgador", &record.orgao_julgador);
    labeled(&mut sections, "Data de Julgamento", &record.data_julgamento);
    labeled(&mut sections, "Data de Publicação", &record.data_publicacao);
    labeled(&mut sections, "EMENTA", &record.ementa);
    labeled(&mut sections, "DECISÃO", &record.decisao);
    labeled(&mut sections, "ACÓRDÃO", &record.acordao);

    if let Some(refs) = list_or_string(&record.referencias_legislativas) {
        sections.push(format!("Referências Legislativas: {refs}"));
    }
    if let Some(palavras) = list_or_string(&record.palavras_chave) {
        sections.push(format!("Palavras-chave: {palavras}"));
    }

    labeled(&mut sections, "Tema", &record.tema);
    labeled(&mut sections, "Ramo do Direito", &record.ramo);
    labeled(&mut sections, "Notas", &record.notas);
    labeled(
        &mut sections,
        "Informações Complementares",
        &record.informacoes_complementares,
    );

    let mut text = sections.join("\n\n");

    // Catch-all: surface any remaining long string field that is not already
    // part of the projected text.
    for (key, value) in &record.extra {
        if let Value::String(s) = value {
            let trimmed = s.trim();
            if trimmed.len() > CATCH_ALL_MIN_CHARS && !text.contains(trimmed) {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&format!("{key}: {trimmed}"));
            }
        }
    }

    let mut metadata = Map::new();
    let mut meta = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            if !v.trim().is_empty() {
                metadata.insert(key.to_string(), Value::from(v.trim()));
            }
        }
    };
    meta("processo", &record.processo);
    meta("classe", &record.classe);
    meta("relator", &record.relator);
    meta("orgao_julgador", &record.orgao_julgador);
    meta("tema", &record.tema);
    meta("data_julgamento", &record.data_julgamento);

    (text, metadata)
}

fn labeled(sections: &mut Vec<String>, label: &str, value: &Option<String>) {
    if let Some(v) = value {
        let trimmed = v.trim();
        if !trimmed.is_empty() {
            sections.push(format!("{label}: {trimmed}"));
        }
    }
}

/// Normalize a list-or-string JSON field into one display string.
fn list_or_string(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Array(items)) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        _ => None,
    }
}
