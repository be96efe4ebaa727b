use orquesta_core::{ConversationTurn, Intent, OrquestaError, OrquestaResult};
use regex::Regex;

/// Weight of a keyword hit in the query itself vs. in trailing history.
const QUERY_WEIGHT: f64 = 1.0;
const HISTORY_WEIGHT: f64 = 0.5;

/// Deterministic keyword classifier: free-text query plus a short context
/// window in, `(intent, confidence)` out.
///
/// The platform is Spanish-facing, so the tables are bilingual. Rule order
/// is fixed and breaks score ties, which keeps classification fully
/// deterministic for identical input and configuration. An empty query
/// yields `Unknown` with confidence 0.0 — never an error.
pub struct IntentClassifier {
    rules: Vec<(Intent, Regex)>,
}

impl IntentClassifier {
    pub fn new() -> OrquestaResult<Self> {
        let tables: &[(Intent, &str)] = &[
            (
                Intent::SummaryRequest,
                r"(?i)\b(resumen|resumir|resum[ií]|summary|summari[sz]e|s[ií]ntesis)\b",
            ),
            (
                Intent::DatabaseQuery,
                r"(?i)\b(consulta|saldo|saldos|cliente|clientes|ventas|registros|base de datos|datos|query|database|sql)\b",
            ),
            (
                Intent::DocumentRequest,
                r"(?i)\b(documento|informe|reporte|report|document|pdf|planilla)\b",
            ),
            (
                Intent::NewsRequest,
                r"(?i)\b(noticia|noticias|titulares|actualidad|news|headlines)\b",
            ),
            (
                Intent::DesktopAction,
                r"(?i)\b(archivo|archivos|carpeta|escritorio|guarda|guardar|escribe|escribir|borra|borrar|file|folder|desktop|write|save|delete)\b",
            ),
            (
                Intent::Conversational,
                r"(?i)\b(hola|buenas|gracias|chau|hello|hi|thanks|ayuda|help)\b",
            ),
        ];
        let mut rules = Vec::with_capacity(tables.len());
        for (intent, pattern) in tables {
            let regex = Regex::new(pattern)
                .map_err(|e| OrquestaError::Config(format!("bad intent pattern: {e}")))?;
            rules.push((*intent, regex));
        }
        Ok(Self { rules })
    }

    /// Classify a query against the trailing history window.
    pub fn classify(&self, query: &str, history: &[ConversationTurn]) -> (Intent, f64) {
        if query.trim().is_empty() {
            return (Intent::Unknown, 0.0);
        }

        let context: String = history
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut best: Option<(Intent, f64)> = None;
        for (intent, regex) in &self.rules {
            let query_hits = regex.find_iter(query).count() as f64;
            let history_hits = regex.find_iter(&context).count() as f64;
            let score = query_hits * QUERY_WEIGHT + history_hits * HISTORY_WEIGHT;
            if score > 0.0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((*intent, score));
            }
        }

        match best {
            Some((intent, score)) => (intent, Self::confidence(score)),
            None => (Intent::Unknown, 0.0),
        }
    }

    /// Monotonic score → confidence mapping, capped below 1.0.
    fn confidence(score: f64) -> f64 {
        (score / (score + 1.5)).min(0.95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new().unwrap()
    }

    #[test]
    fn summary_request_in_spanish() {
        let (intent, confidence) = classifier().classify("dame un resumen", &[]);
        assert_eq!(intent, Intent::SummaryRequest);
        assert!(confidence >= 0.3, "confidence {confidence} too low");
    }

    #[test]
    fn empty_query_is_unknown_with_zero_confidence() {
        let (intent, confidence) = classifier().classify("   ", &[]);
        assert_eq!(intent, Intent::Unknown);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let history = vec![ConversationTurn::user("hola, necesito ayuda")];
        let first = c.classify("consulta de saldos de clientes", &history);
        for _ in 0..10 {
            assert_eq!(c.classify("consulta de saldos de clientes", &history), first);
        }
        assert_eq!(first.0, Intent::DatabaseQuery);
    }

    #[test]
    fn history_contributes_at_half_weight() {
        let c = classifier();
        let history = vec![ConversationTurn::user("quiero noticias de actualidad")];
        // Ambiguous follow-up leans on the history window.
        let (intent, confidence) = c.classify("y las noticias?", &history);
        assert_eq!(intent, Intent::NewsRequest);
        let (_, solo_confidence) = c.classify("y las noticias?", &[]);
        assert!(confidence > solo_confidence);
    }

    #[test]
    fn gibberish_is_unknown() {
        let (intent, confidence) = classifier().classify("xyzzy plugh", &[]);
        assert_eq!(intent, Intent::Unknown);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn desktop_write_detected() {
        let (intent, _) = classifier().classify("escribe un archivo en el escritorio", &[]);
        assert_eq!(intent, Intent::DesktopAction);
    }
}
