/// System message for the final answer generation.
pub const ANSWER_SYSTEM_MESSAGE: &str = "\
Você é um assistente jurídico especializado na jurisprudência do Superior \
Tribunal de Justiça. Responda à consulta usando exclusivamente o contexto \
fornecido. Cite as entidades, processos e legislação mencionados no contexto \
que fundamentam a resposta. Quando o contexto for insuficiente para \
responder, diga isso explicitamente. Responda em português.";

/// Canned answer returned when every retriever came back empty.
pub const NO_CONTEXT_ANSWER: &str =
    "Não foi possível encontrar informações relevantes para a sua consulta.";

/// Assemble the generation prompt with clearly labeled context sections.
pub fn build_prompt(query: &str, local: &str, global: &str, vector: &str) -> String {
    let mut sections = Vec::new();

    if !local.trim().is_empty() {
        sections.push(format!("=== CONTEXTO DO GRAFO ===\n{local}"));
    }
    if !global.trim().is_empty() {
        sections.push(format!("=== CONTEXTO GLOBAL ===\n{global}"));
    }
    if !vector.trim().is_empty() {
        sections.push(format!("=== CONTEXTO VETORIAL ===\n{vector}"));
    }

    sections.push(format!("=== CONSULTA ===\n{query}"));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_only_populated_sections() {
        let prompt = build_prompt("qual a tese?", "grafo aqui", "", "vetor aqui");

        assert!(prompt.contains("=== CONTEXTO DO GRAFO ===\ngrafo aqui"));
        assert!(!prompt.contains("=== CONTEXTO GLOBAL ==="));
        assert!(prompt.contains("=== CONTEXTO VETORIAL ===\nvetor aqui"));
        assert!(prompt.contains("=== CONSULTA ===\nqual a tese?"));
    }

    #[test]
    fn section_order_is_graph_global_vector_query() {
        let prompt = build_prompt("q", "l", "g", "v");
        let graph = prompt.find("CONTEXTO DO GRAFO").expect("graph section");
        let global = prompt.find("CONTEXTO GLOBAL").expect("global section");
        let vector = prompt.find("CONTEXTO VETORIAL").expect("vector section");
        let query = prompt.find("CONSULTA").expect("query section");
        assert!(graph < global && global < vector && vector < query);
    }
}
