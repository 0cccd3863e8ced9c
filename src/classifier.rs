/// Terms that mark a question as legal/regulatory. Matched as raw
/// substrings of the lower-cased input, so "codex" matches "code".
pub const TRIGGER_TERMS: &[&str] = &[
    "code",
    "loi",
    "article",
    "juridique",
    "droit",
    "tribunal",
    "jurisprudence",
    "décret",
    "ordonnance",
    "réglementation",
    "légal",
    "conforme",
    "confirmité",
];

pub const WEB_VERIFICATION_DIRECTIVE: &str = "INSTRUCTION IMPORTANTE: Cette question concerne le droit. \
Tu DOIS absolument effectuer une recherche internet systématique pour obtenir les informations \
les plus récentes et précises. Utilise tes outils de recherche web pour vérifier les sources \
officielles, codes, lois et jurisprudences actuelles avant de répondre.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_regulated_domain: bool,
    pub effective_text: String,
}

pub fn is_regulated_domain(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRIGGER_TERMS.iter().any(|term| lower.contains(term))
}

pub fn classify(text: &str) -> Classification {
    if is_regulated_domain(text) {
        Classification {
            is_regulated_domain: true,
            effective_text: format!(
                "{WEB_VERIFICATION_DIRECTIVE}\n\nQuestion de l'utilisateur: {text}"
            ),
        }
    } else {
        Classification {
            is_regulated_domain: false,
            effective_text: text.to_string(),
        }
    }
}
