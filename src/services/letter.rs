use std::time::Duration;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::configuration::{ApiSettings, CandidateSettings};
use crate::domain::contact::CompanyInfo;

use super::site_prober::{SiteProbeResult, SiteProber};

const SYSTEM_PROMPT: &str =
    "Tu es un expert en rédaction de lettres de motivation professionnelles, claires et personnalisées.";

const SALUTATIONS: [&str; 4] = ["Cher", "Bonjour", "Madame", "Monsieur"];

#[derive(Debug)]
pub enum GenerationError {
    RateLimited { attempts: u32 },
    Transport(String),
    EmptyResponse,
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::RateLimited { attempts } => {
                write!(f, "Rate limited after {} attempts", attempts)
            }
            GenerationError::Transport(reason) => write!(f, "API call failed: {}", reason),
            GenerationError::EmptyResponse => write!(f, "API returned no completion"),
        }
    }
}

impl std::error::Error for GenerationError {}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

pub struct LetterGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    backoff_factor: f64,
    rate_limit_pause: f64,
    signature: String,
}

impl LetterGenerator {
    pub fn new(api: &ApiSettings, candidate: &CandidateSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.request_timeout_secs))
            .build()
            .unwrap();

        LetterGenerator {
            client,
            base_url: api.base_url.clone(),
            api_key: api.api_key.clone(),
            model: api.model.clone(),
            max_retries: api.max_retries,
            backoff_factor: api.backoff_factor,
            rate_limit_pause: api.rate_limit_pause_secs,
            signature: candidate.signature.clone(),
        }
    }

    /// Crawls the company website when one is known, asks the completions API
    /// for a tailored letter, and falls back to a canned one when the API is
    /// out of reach. Never fails.
    pub async fn generate(&self, info: &CompanyInfo, prober: &SiteProber) -> String {
        let site_info = match info.website.is_empty() {
            true => SiteProbeResult::default(),
            false => {
                log::info!("Crawling {}...", info.website);
                let probed = prober.probe(&info.website).await;
                log::info!("Crawling finished.");
                probed
            }
        };

        let prompt = build_prompt(info, &site_info);

        match self.complete(&prompt).await {
            Ok(text) => tidy_letter(&text, &self.signature),
            Err(e) => {
                log::error!("Failed to generate the letter for {}: {}", info.title, e);
                fallback_letter(info)
            }
        }
    }

    /// One chat completion with 429-aware exponential backoff.
    pub async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.7,
            max_tokens: 1024,
        };

        let mut last_error = GenerationError::RateLimited { attempts: 0 };

        for attempt in 0..self.max_retries {
            let wait_secs = self.rate_limit_pause * self.backoff_factor.powi(attempt as i32);

            match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: ChatResponse = response
                            .json()
                            .await
                            .map_err(|e| GenerationError::Transport(e.to_string()))?;
                        return match parsed.choices.into_iter().next() {
                            Some(choice) => Ok(choice.message.content),
                            None => Err(GenerationError::EmptyResponse),
                        };
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        log::warn!(
                            "Rate limit hit. Waiting {:.1}s before retrying ({}/{})",
                            wait_secs,
                            attempt + 1,
                            self.max_retries
                        );
                        last_error = GenerationError::RateLimited {
                            attempts: attempt + 1,
                        };
                        tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
                        continue;
                    }

                    last_error =
                        GenerationError::Transport(format!("API returned status {}", status));
                }
                Err(e) => {
                    last_error = GenerationError::Transport(e.to_string());
                }
            }

            if attempt + 1 < self.max_retries {
                log::warn!(
                    "API call failed: {}. Retrying in {:.1}s ({}/{})",
                    last_error,
                    wait_secs,
                    attempt + 1,
                    self.max_retries
                );
                tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
            }
        }

        Err(last_error)
    }
}

pub fn build_prompt(info: &CompanyInfo, site_info: &SiteProbeResult) -> String {
    let mut extra = String::new();
    if !site_info.description.is_empty() {
        extra.push_str(&format!(
            "\nDescription de l'entreprise: {}\n",
            site_info.description
        ));
    }
    if !site_info.values.is_empty() {
        extra.push_str(&format!(
            "\nValeurs de l'entreprise: {}\n",
            site_info.values.join(", ")
        ));
    }
    if !site_info.expertises.is_empty() {
        extra.push_str(&format!(
            "\nDomaines d'expertise: {}\n",
            site_info.expertises.join(", ")
        ));
    }
    if !site_info.projects.is_empty() {
        extra.push_str(&format!(
            "\nProjets/clients notables: {}\n",
            site_info.projects.join(", ")
        ));
    }

    format!(
        "Écris une lettre de motivation personnalisée et spécifique pour un stage en développement informatique chez {company},
qui est une entreprise du secteur {category} située à {city}.

{extra}

Consignes très importantes:
- La lettre est pour un candidat masculin nommé Elijah Lasserre, 22 ans
- Commence directement par \"Madame, Monsieur,\" sans aucun texte d'introduction
- NE PAS utiliser de placeholders comme [votre domaine] ou [compétence spécifique]
- Mentionne spécifiquement l'entreprise {company} et ses activités
- Fais référence à des compétences précises: HTML, CSS, TypeScript, React, Java et cybersécurité
- Mentionne mon expérience de stage précédente en développement web chez S2E Groupe
- Évite les formules trop génériques ou qui pourraient s'appliquer à n'importe quelle entreprise
- Adapte le contenu spécifiquement à l'activité de {company} et son secteur ({category})
- La lettre doit être professionnelle mais pas trop formelle
- N'utilise pas la signature à la fin, elle sera ajoutée automatiquement",
        company = info.title,
        category = info.category,
        city = info.city,
        extra = extra,
    )
}

/// Turns a raw completion into a presentable letter: drop any model preamble,
/// drop subject lines, fill generic placeholders, fix mangled characters and
/// normalize the closing signature.
pub fn tidy_letter(text: &str, signature: &str) -> String {
    let mut text = match SALUTATIONS.iter().filter_map(|s| text.find(s)).min() {
        Some(idx) => text[idx..].to_string(),
        None => text.to_string(),
    };

    let objet_regex = Regex::new(r"Objet\s*:\s*.*?\n").unwrap();
    text = objet_regex.replace_all(&text, "").to_string();

    text = text
        .replace("[Votre nom]", "")
        .replace("[Nom]", "")
        .replace("étudiant(e)", "étudiant")
        .replace("candidat(e)", "candidat")
        .replace("[votre domaine]", "développement informatique")
        .replace("[compétence spécifique]", "développement web moderne");

    let blank_lines_regex = Regex::new(r"\n\s*\n\s*\n+").unwrap();
    text = blank_lines_regex.replace_all(&text, "\n\n").to_string();

    text = text.replace("?uvre", "œuvre").replace('?', "'");

    match text.contains("Cordialement") {
        false => {
            text = format!("{}{}", text.trim_end(), signature);
        }
        true => {
            let closing_regex = Regex::new(r"Cordialement,?\s*(\[.*?\])?\s*$").unwrap();
            text = closing_regex
                .replace(&text, NoExpand(signature.trim_start()))
                .to_string();
        }
    }

    text.trim().to_string()
}

pub fn fallback_letter(info: &CompanyInfo) -> String {
    let company = match info.title.is_empty() {
        true => "votre entreprise",
        false => info.title.as_str(),
    };
    let category = match info.category.is_empty() {
        true => "technologique",
        false => info.category.as_str(),
    };

    format!(
        "Madame, Monsieur,

Je me permets de vous adresser ma candidature pour un stage en développement informatique au sein de {company}.

Actuellement en formation de Concepteur Développeur d'Applications, je suis à la recherche d'une opportunité de stage de 4 mois (du 10 septembre 2024 au 9 janvier 2025) pour mettre en pratique mes compétences en programmation et contribuer à des projets concrets. Votre entreprise m'intéresse particulièrement pour son expertise dans le domaine {category}.

Au cours de ma formation et de mon précédent stage chez S2E Groupe, j'ai acquis des compétences solides en développement web (HTML, CSS, JavaScript, TypeScript, React) ainsi qu'en programmation Java et en cybersécurité. Cette expérience m'a permis de développer ma capacité à résoudre des problèmes complexes et à m'adapter rapidement à différents environnements techniques.

Je suis convaincu que mon profil correspondrait aux attentes de votre entreprise et je serais ravi de pouvoir échanger avec vous lors d'un entretien pour vous présenter plus en détail mon parcours et mes motivations.

Vous trouverez en pièce jointe mon CV détaillant mon parcours et mes compétences.
",
        company = company,
        category = category,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::CrawlerSettings;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SIGNATURE: &str = "\n\nCordialement,\nElijah Lasserre\nTél: 06 18 47 62 31\n";

    #[test]
    fn tidy_strips_preamble_subject_and_placeholders() {
        let raw = "Bien sûr ! Voici la lettre demandée :\n\nMadame, Monsieur,\nObjet : Candidature pour un stage\n\nEn tant qu'étudiant(e) en [votre domaine], je mets en ?uvre des projets web.\n\n\n\nCordialement,\n[Votre nom]";

        let tidied = tidy_letter(raw, SIGNATURE);

        assert!(tidied.starts_with("Madame, Monsieur,"));
        assert!(!tidied.contains("Objet"));
        assert!(!tidied.contains("Voici la lettre"));
        assert!(tidied.contains("étudiant en développement informatique"));
        assert!(tidied.contains("œuvre"));
        assert!(!tidied.contains("\n\n\n"));
        assert!(tidied.ends_with("Tél: 06 18 47 62 31"));
    }

    #[test]
    fn tidy_appends_signature_when_no_closing_exists() {
        let raw = "Madame, Monsieur,\n\nJe vous écris au sujet du stage.";

        let tidied = tidy_letter(raw, SIGNATURE);

        assert!(tidied.contains("Cordialement,\nElijah Lasserre"));
    }

    #[test]
    fn prompt_carries_company_and_probe_sections() {
        let info = CompanyInfo {
            title: "Atelier Bois".to_string(),
            category: "Menuiserie".to_string(),
            city: "Lyon".to_string(),
            ..Default::default()
        };
        let site_info = SiteProbeResult {
            description: "Menuiserie artisanale depuis 1987.".to_string(),
            values: vec!["Excellence".to_string(), "Transmission".to_string()],
            expertises: vec![],
            projects: vec![],
        };

        let prompt = build_prompt(&info, &site_info);

        assert!(prompt.contains("chez Atelier Bois"));
        assert!(prompt.contains("secteur Menuiserie située à Lyon"));
        assert!(prompt.contains("Description de l'entreprise: Menuiserie artisanale depuis 1987."));
        assert!(prompt.contains("Valeurs de l'entreprise: Excellence, Transmission"));
        assert!(!prompt.contains("Domaines d'expertise"));
    }

    fn test_generator(base_url: String, max_retries: u32) -> LetterGenerator {
        let api = ApiSettings {
            base_url,
            api_key: "test-key".to_string(),
            model: "mistral-large-latest".to_string(),
            max_retries,
            backoff_factor: 1.0,
            rate_limit_pause_secs: 0.0,
            request_timeout_secs: 2,
        };
        let candidate = CandidateSettings {
            name: "Elijah Lasserre".to_string(),
            signature: SIGNATURE.to_string(),
            cv_path: "votre_cv.pdf".to_string(),
        };
        LetterGenerator::new(&api, &candidate)
    }

    async fn spawn_rate_limited_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buffer = vec![0u8; 16384];
                    let mut read = 0;
                    while read < buffer.len() {
                        match socket.read(&mut buffer[read..]).await {
                            Ok(0) => break,
                            Ok(n) => {
                                read += n;
                                let head = String::from_utf8_lossy(&buffer[..read]).to_string();
                                if let Some(body_start) = head.find("\r\n\r\n") {
                                    let content_length = head
                                        .lines()
                                        .find(|l| l.to_lowercase().starts_with("content-length:"))
                                        .and_then(|l| l.split(':').nth(1))
                                        .and_then(|v| v.trim().parse::<usize>().ok())
                                        .unwrap_or(0);
                                    if read >= body_start + 4 + content_length {
                                        break;
                                    }
                                }
                            }
                            Err(_) => break,
                        }
                    }
                    let response = "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn exhausted_rate_limit_retries_surface_as_error() {
        let base_url = spawn_rate_limited_server().await;
        let generator = test_generator(base_url, 2);

        let result = generator.complete("peu importe").await;

        assert!(matches!(
            result,
            Err(GenerationError::RateLimited { attempts: 2 })
        ));
    }

    #[tokio::test]
    async fn generate_falls_back_to_canned_letter_on_api_failure() {
        let base_url = spawn_rate_limited_server().await;
        let generator = test_generator(base_url, 1);
        let prober = SiteProber::new(&CrawlerSettings {
            max_depth: 1,
            max_pages: 1,
            delay_ms: 0,
            timeout_secs: 1,
            user_agent: "Mozilla/5.0 (compatible; test)".to_string(),
        });

        let info = CompanyInfo {
            title: "Atelier Bois".to_string(),
            category: "Menuiserie".to_string(),
            ..Default::default()
        };

        let letter = generator.generate(&info, &prober).await;

        assert!(letter.starts_with("Madame, Monsieur,"));
        assert!(letter.contains("au sein de Atelier Bois"));
        assert!(letter.contains("dans le domaine Menuiserie"));
    }
}
