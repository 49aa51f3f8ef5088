use std::collections::HashMap;

use crate::model::{ConstValue, Environment, InsnKind, MethodRecord};
use crate::passes::constants::significant;
use crate::ranker::fnv1a;

pub(crate) const DEFAULT_TOP_K: usize = 20;

/// Tiered token namespaces over one method: constants, descriptor, size
/// bucket, normalized references, opcode n-grams, and the opcode histogram.
pub(crate) fn method_tokens(method: &MethodRecord, env: &Environment) -> Vec<String> {
    let mut tokens = Vec::new();

    for value in &method.constants {
        match value {
            ConstValue::Str(text) => {
                tokens.push(format!("USTR:{:016x}", fnv1a(text.as_bytes())));
            }
            ConstValue::Int(v) if significant(value) => tokens.push(format!("UNUM:{v}")),
            ConstValue::Long(v) if significant(value) => tokens.push(format!("UNUM:{v}")),
            ConstValue::Float(v) if significant(value) => tokens.push(format!("UNUM:{v}")),
            ConstValue::Double(v) if significant(value) => tokens.push(format!("UNUM:{v}")),
            _ => {}
        }
    }

    tokens.push(format!("DESC:{}", method.descriptor));
    tokens.push(format!("SIZE:{}", size_bucket(method.code.len())));

    for insn in &method.code {
        match &insn.kind {
            InsnKind::Call { owner, name, .. } => {
                tokens.push(format!("MCALL:{}", normalize_member(owner, name, env)));
            }
            InsnKind::Field { owner, name } => {
                tokens.push(format!("FACCS:{}", normalize_member(owner, name, env)));
            }
            InsnKind::Type(name) => {
                let element = element_type(name);
                if !type_is_obfuscated(element, env) {
                    tokens.push(format!("NEWTYPE:{element}"));
                }
            }
            InsnKind::Plain => {}
        }
    }

    let opcode_stream: Vec<u8> = method.code.iter().map(|insn| insn.opcode).collect();
    for window in opcode_stream.windows(3) {
        tokens.push(format!("NG3:{:02x}_{:02x}_{:02x}", window[0], window[1], window[2]));
    }
    for window in opcode_stream.windows(4) {
        tokens.push(format!(
            "NG4:{:02x}_{:02x}_{:02x}_{:02x}",
            window[0], window[1], window[2], window[3]
        ));
    }
    for opcode in &opcode_stream {
        tokens.push(format!("OPC:{opcode:02x}"));
    }

    tokens
}

/// Obfuscated owners and member names collapse to the literal `OBF` so the
/// token survives re-obfuscation; reserved names stay visible.
pub(crate) fn normalize_member(owner: &str, name: &str, env: &Environment) -> String {
    match env.class(owner) {
        Some(class) if class.obfuscated => {
            if name.starts_with('<') {
                format!("OBF.{name}")
            } else {
                "OBF.OBF".to_string()
            }
        }
        _ => format!("{owner}.{name}"),
    }
}

/// Strip array and object-descriptor wrapping from a type reference.
pub(crate) fn element_type(name: &str) -> &str {
    let stripped = name.trim_start_matches('[');
    match stripped.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        Some(inner) => inner,
        None => stripped,
    }
}

pub(crate) fn type_is_obfuscated(name: &str, env: &Environment) -> bool {
    env.class(name).is_some_and(|class| class.obfuscated)
}

fn size_bucket(instruction_count: usize) -> &'static str {
    match instruction_count {
        0..=9 => "TINY",
        10..=49 => "SMALL",
        50..=199 => "MEDIUM",
        200..=499 => "LARGE",
        _ => "HUGE",
    }
}

struct Document {
    key: String,
    weights: HashMap<String, f64>,
    norm: f64,
}

/// Document-frequency model over the target corpus. Query weight for a token
/// is `(count / |doc|) * ln(N / df)`; similarity is the cosine over the
/// sparse vectors.
pub(crate) struct TfIdfIndex {
    documents: Vec<Document>,
    document_frequency: HashMap<String, usize>,
}

impl TfIdfIndex {
    pub(crate) fn build(corpus: Vec<(String, Vec<String>)>) -> Self {
        let counted: Vec<(String, HashMap<String, usize>, usize)> = corpus
            .into_iter()
            .map(|(key, tokens)| {
                let length = tokens.len();
                let mut counts: HashMap<String, usize> = HashMap::new();
                for token in tokens {
                    *counts.entry(token).or_insert(0) += 1;
                }
                (key, counts, length)
            })
            .collect();

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for (_, counts, _) in &counted {
            for token in counts.keys() {
                *document_frequency.entry(token.clone()).or_insert(0) += 1;
            }
        }

        let corpus_size = counted.len();
        let documents = counted
            .into_iter()
            .map(|(key, counts, length)| {
                let mut weights = HashMap::new();
                let mut norm = 0.0f64;
                for (token, count) in counts {
                    let idf = (corpus_size as f64 / document_frequency[&token] as f64).ln();
                    let weight = count as f64 / length.max(1) as f64 * idf;
                    norm += weight * weight;
                    weights.insert(token, weight);
                }
                Document {
                    key,
                    weights,
                    norm: norm.sqrt(),
                }
            })
            .collect();

        Self {
            documents,
            document_frequency,
        }
    }

    /// Top-k corpus documents by cosine similarity against the query bag.
    /// Documents sharing no informative token score 0; a zero-norm side
    /// yields 0 rather than NaN.
    pub(crate) fn query(&self, tokens: &[String], top_k: usize) -> Vec<(String, f64)> {
        let corpus_size = self.documents.len();
        if corpus_size == 0 || tokens.is_empty() {
            return Vec::new();
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }
        let mut weights: HashMap<&str, f64> = HashMap::new();
        let mut query_norm = 0.0f64;
        for (token, count) in counts {
            let Some(frequency) = self.document_frequency.get(token) else {
                continue;
            };
            let idf = (corpus_size as f64 / *frequency as f64).ln();
            let weight = count as f64 / tokens.len() as f64 * idf;
            query_norm += weight * weight;
            weights.insert(token, weight);
        }
        let query_norm = query_norm.sqrt();

        let mut scores: Vec<(String, f64)> = self
            .documents
            .iter()
            .map(|document| {
                let mut dot = 0.0f64;
                for (token, query_weight) in &weights {
                    if let Some(document_weight) = document.weights.get(*token) {
                        dot += query_weight * document_weight;
                    }
                }
                let denominator = query_norm * document.norm;
                let score = if denominator == 0.0 { 0.0 } else { dot / denominator };
                (document.key.clone(), score)
            })
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores.truncate(top_k);
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use crate::opcodes;

    #[test]
    fn an_empty_method_still_yields_descriptor_and_size_tokens() {
        let env = Environment::default();
        let method = fixtures::method("a", "m", "(I)V", true);
        let tokens = method_tokens(&method, &env);
        assert_eq!(tokens, vec!["DESC:(I)V".to_string(), "SIZE:TINY".to_string()]);
    }

    #[test]
    fn ngrams_and_histogram_cover_the_opcode_stream() {
        let env = Environment::default();
        let mut method = fixtures::method("a", "m", "()V", true);
        method.code = fixtures::plain_code(&[
            opcodes::ALOAD_0,
            opcodes::DUP,
            opcodes::LDC,
            opcodes::RETURN,
        ]);
        let tokens = method_tokens(&method, &env);

        assert!(tokens.contains(&"NG3:2a_59_12".to_string()));
        assert!(tokens.contains(&"NG4:2a_59_12_b1".to_string()));
        assert_eq!(tokens.iter().filter(|t| t.starts_with("OPC:")).count(), 4);
    }

    #[test]
    fn obfuscated_call_owners_collapse_to_obf() {
        let mut env = Environment::default();
        env.insert_class(fixtures::class("zz", true));
        env.insert_class(fixtures::class("classKnown", false));

        assert_eq!(normalize_member("zz", "a", &env), "OBF.OBF");
        assert_eq!(normalize_member("zz", "<init>", &env), "OBF.<init>");
        assert_eq!(
            normalize_member("classKnown", "methodGo", &env),
            "classKnown.methodGo"
        );
        assert_eq!(
            normalize_member("java/lang/String", "length", &env),
            "java/lang/String.length"
        );
    }

    #[test]
    fn array_type_references_unwrap_to_their_element() {
        assert_eq!(element_type("[Ljava/lang/String;"), "java/lang/String");
        assert_eq!(element_type("[[I"), "I");
        assert_eq!(element_type("com/example/Box"), "com/example/Box");
    }

    #[test]
    fn query_ranks_the_document_sharing_rare_tokens_first() {
        let index = TfIdfIndex::build(vec![
            (
                "x".to_string(),
                vec!["USTR:abc".to_string(), "DESC:()V".to_string()],
            ),
            (
                "y".to_string(),
                vec!["USTR:def".to_string(), "DESC:()V".to_string()],
            ),
        ]);

        let ranked = index.query(
            &["USTR:abc".to_string(), "DESC:()V".to_string()],
            DEFAULT_TOP_K,
        );

        assert_eq!(ranked[0].0, "x");
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn cosine_is_zero_when_a_norm_vanishes() {
        // The only shared token appears in every document, so all weights
        // are zero and every similarity must be 0, not NaN.
        let index = TfIdfIndex::build(vec![
            ("x".to_string(), vec!["DESC:()V".to_string()]),
            ("y".to_string(), vec!["DESC:()V".to_string()]),
        ]);

        let ranked = index.query(&["DESC:()V".to_string()], DEFAULT_TOP_K);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].1, 0.0);
        assert_eq!(ranked[1].1, 0.0);
    }

    #[test]
    fn unknown_query_tokens_are_ignored() {
        let index = TfIdfIndex::build(vec![(
            "x".to_string(),
            vec!["DESC:()V".to_string(), "OPC:b1".to_string()],
        )]);
        let ranked = index.query(&["USTR:zzz".to_string()], DEFAULT_TOP_K);
        assert!(ranked.iter().all(|(_, score)| *score == 0.0));
    }
}
