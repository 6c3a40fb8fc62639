use std::collections::HashSet;
use std::time::Duration;

use itertools::Itertools;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::configuration::CrawlerSettings;

const ABOUT_KEYWORDS: [&str; 6] = [
    "a-propos",
    "qui-sommes-nous",
    "about",
    "entreprise",
    "presentation",
    "societe",
];
const VALUES_KEYWORDS: [&str; 6] = [
    "valeurs",
    "values",
    "notre-mission",
    "mission",
    "vision",
    "philosophie",
];
const EXPERTISE_KEYWORDS: [&str; 6] = [
    "expertise",
    "competences",
    "services",
    "solutions",
    "offres",
    "savoir-faire",
];
const PROJECTS_KEYWORDS: [&str; 5] = [
    "projets",
    "realisations",
    "portfolio",
    "references",
    "clients",
];

const DESCRIPTION_MARKERS: [&str; 6] = [
    "entreprise",
    "société",
    "nous",
    "expert",
    "spécialisé",
    "créé",
];

const EXCLUDED_CONTAINERS: [&str; 5] = ["script", "style", "nav", "header", "footer"];

/// What a crawl of a company website yielded. Every field may be empty, a
/// probe never fails.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SiteProbeResult {
    pub description: String,
    pub values: Vec<String>,
    pub expertises: Vec<String>,
    pub projects: Vec<String>,
}

enum PageKind {
    About,
    Values,
    Expertise,
    Projects,
    Other,
}

pub struct SiteProber {
    client: reqwest::Client,
    max_depth: usize,
    max_pages: usize,
    delay: Duration,
}

impl SiteProber {
    pub fn new(settings: &CrawlerSettings) -> Self {
        let user_agent = match settings.user_agent.is_empty() {
            true => fake_user_agent::get_rua().to_string(),
            false => settings.user_agent.clone(),
        };

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap();

        SiteProber {
            client,
            max_depth: settings.max_depth,
            max_pages: settings.max_pages,
            delay: Duration::from_millis(settings.delay_ms),
        }
    }

    /// Breadth-first crawl of a company website, bounded by depth and page
    /// caps, harvesting the description, values, expertises and projects.
    pub async fn probe(&self, website: &str) -> SiteProbeResult {
        let mut result = SiteProbeResult::default();

        let Some((base_url, host)) = normalize_base_url(website) else {
            return result;
        };

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = vec![base_url.clone()];
        let mut depth = 0;

        while !frontier.is_empty() && depth < self.max_depth && visited.len() < self.max_pages {
            let mut next_frontier: Vec<String> = Vec::new();

            for current_url in frontier {
                if visited.contains(&current_url) || visited.len() >= self.max_pages {
                    continue;
                }
                visited.insert(current_url.clone());

                tokio::time::sleep(self.delay).await;

                let response = match self.client.get(current_url.as_str()).send().await {
                    Ok(res) => res,
                    Err(e) => {
                        log::error!("Failed to fetch {}: {:?}", current_url, e);
                        continue;
                    }
                };
                if !response.status().is_success() {
                    continue;
                }
                let html = match response.text().await {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Failed to read body of {}: {:?}", current_url, e);
                        continue;
                    }
                };

                let collect_links = depth + 1 < self.max_depth;
                let links = harvest_page(
                    &html,
                    &current_url,
                    &base_url,
                    &host,
                    collect_links,
                    &mut result,
                );
                for link in links {
                    if !visited.contains(&link) && !next_frontier.contains(&link) {
                        next_frontier.push(link);
                    }
                }
            }

            frontier = next_frontier;
            depth += 1;
        }

        result.values = result.values.into_iter().unique().take(5).collect();
        result.expertises = result.expertises.into_iter().unique().take(5).collect();
        result.projects = result.projects.into_iter().unique().take(3).collect();

        result
    }
}

fn normalize_base_url(website: &str) -> Option<(String, String)> {
    if !website.starts_with("http://") && !website.starts_with("https://") {
        return None;
    }

    let parsed = Url::parse(website).ok()?;
    let host = parsed.host_str()?.to_string();
    let base = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };

    Some((base, host))
}

fn classify_page(url: &str) -> PageKind {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        Err(_) => return PageKind::Other,
    };

    if ABOUT_KEYWORDS.iter().any(|k| path.contains(k)) {
        return PageKind::About;
    }
    if VALUES_KEYWORDS.iter().any(|k| path.contains(k)) {
        return PageKind::Values;
    }
    if EXPERTISE_KEYWORDS.iter().any(|k| path.contains(k)) {
        return PageKind::Expertise;
    }
    if PROJECTS_KEYWORDS.iter().any(|k| path.contains(k)) {
        return PageKind::Projects;
    }

    PageKind::Other
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .join(" ")
}

fn in_excluded_container(element: ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| EXCLUDED_CONTAINERS.contains(&ancestor.value().name()))
}

/// Harvests one fetched page into the running probe result and returns the
/// same-host links worth visiting next. Parsing stays in one synchronous pass
/// so the DOM never lives across an await point.
fn harvest_page(
    html: &str,
    current_url: &str,
    base_url: &str,
    host: &str,
    collect_links: bool,
    result: &mut SiteProbeResult,
) -> Vec<String> {
    let document = Html::parse_document(html);
    let is_base = current_url == base_url;
    let kind = classify_page(current_url);

    if matches!(kind, PageKind::About) || is_base {
        harvest_description(&document, result);
    } else {
        match kind {
            PageKind::Values => harvest_values(&document, result),
            PageKind::Expertise => harvest_expertises(&document, result),
            PageKind::Projects => harvest_projects(&document, result),
            _ => {}
        }
    }

    if is_base && result.description.is_empty() {
        harvest_title_fallback(&document, result);
    }

    match collect_links {
        true => harvest_links(&document, base_url, host),
        false => vec![],
    }
}

fn harvest_description(document: &Html, result: &mut SiteProbeResult) {
    let main_selector = Selector::parse(
        "main, div[class*=\"content\"], div[class*=\"main\"], div[class*=\"body\"]",
    )
    .unwrap();
    let p_selector = Selector::parse("p").unwrap();

    let paragraphs: Vec<ElementRef> = match document.select(&main_selector).next() {
        Some(container) => container.select(&p_selector).collect(),
        None => document.select(&p_selector).collect(),
    };

    for p in paragraphs {
        if in_excluded_container(p) {
            continue;
        }
        let text = element_text(p);
        let text_lower = text.to_lowercase();
        if text.len() > 100
            && DESCRIPTION_MARKERS.iter().any(|m| text_lower.contains(m))
            && result.description.len() < text.len()
        {
            result.description = text;
        }
    }
}

fn harvest_values(document: &Html, result: &mut SiteProbeResult) {
    let item_selector = Selector::parse("ul li, ol li").unwrap();

    for item in document.select(&item_selector) {
        if in_excluded_container(item) {
            continue;
        }
        let text = element_text(item);
        if text.len() > 10 && text.len() < 100 {
            result.values.push(text);
        }
    }
}

fn harvest_expertises(document: &Html, result: &mut SiteProbeResult) {
    let heading_selector = Selector::parse("h2, h3, h4").unwrap();
    let item_selector = Selector::parse("ul li, ol li").unwrap();

    for heading in document.select(&heading_selector) {
        if in_excluded_container(heading) {
            continue;
        }
        let text = element_text(heading);
        if text.len() > 5 && text.len() < 50 {
            result.expertises.push(text);
        }
    }

    for item in document.select(&item_selector) {
        if in_excluded_container(item) {
            continue;
        }
        let text = element_text(item);
        if text.len() > 5 && text.len() < 100 {
            result.expertises.push(text);
        }
    }
}

fn harvest_projects(document: &Html, result: &mut SiteProbeResult) {
    let element_selector = Selector::parse("h3, h4, div").unwrap();
    let class_regex = Regex::new(r"project|client|reference").unwrap();

    for element in document.select(&element_selector) {
        if in_excluded_container(element) {
            continue;
        }
        let Some(class_attr) = element.value().attr("class") else {
            continue;
        };
        if !class_regex.is_match(class_attr) {
            continue;
        }
        let text = element_text(element);
        if text.len() > 5 && text.len() < 100 {
            result.projects.push(text);
        }
    }
}

fn harvest_title_fallback(document: &Html, result: &mut SiteProbeResult) {
    let title_selector = Selector::parse("title").unwrap();
    let meta_selector = Selector::parse("meta[name=\"description\"]").unwrap();

    if let Some(title_tag) = document.select(&title_selector).next() {
        let title = element_text(title_tag);
        if title.len() > 10 {
            result.description = format!("Entreprise: {}. ", title);
        }
    }

    if let Some(meta) = document.select(&meta_selector).next() {
        if let Some(content) = meta.value().attr("content") {
            if content.len() > 20 {
                result.description.push_str(content.trim());
            }
        }
    }
}

fn harvest_links(document: &Html, base_url: &str, host: &str) -> Vec<String> {
    let a_selector = Selector::parse("a[href]").unwrap();
    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(_) => return vec![],
    };

    let mut links = vec![];

    for a_tag in document.select(&a_selector) {
        let Some(href) = a_tag.value().attr("href") else {
            continue;
        };
        if !href.starts_with('/') && !(href.starts_with(base_url) && !href.starts_with('#')) {
            continue;
        }
        let Ok(full_url) = base.join(href) else {
            continue;
        };
        if full_url.host_str() != Some(host) {
            continue;
        }

        let mut full_url = full_url;
        full_url.set_fragment(None);
        let full_url_lower = full_url.as_str().to_lowercase();

        let interesting = ABOUT_KEYWORDS
            .iter()
            .chain(VALUES_KEYWORDS.iter())
            .chain(EXPERTISE_KEYWORDS.iter())
            .chain(PROJECTS_KEYWORDS.iter())
            .any(|k| full_url_lower.contains(k));

        if interesting {
            links.push(full_url.to_string());
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_settings() -> CrawlerSettings {
        CrawlerSettings {
            max_depth: 2,
            max_pages: 5,
            delay_ms: 0,
            timeout_secs: 1,
            user_agent: "Mozilla/5.0 (compatible; test)".to_string(),
        }
    }

    #[test]
    fn rejects_non_http_websites() {
        assert!(normalize_base_url("ftp://entreprise.fr").is_none());
        assert!(normalize_base_url("entreprise.fr").is_none());
        assert_eq!(
            normalize_base_url("https://entreprise.fr/a-propos?x=1"),
            Some((
                "https://entreprise.fr".to_string(),
                "entreprise.fr".to_string()
            ))
        );
    }

    #[test]
    fn harvests_description_values_and_links_from_html() {
        let html = r#"
        <html>
          <head><title>Atelier Bois</title></head>
          <body>
            <nav><p>Une entreprise de navigation avec beaucoup de texte qui ne devrait jamais être retenu comme description principale du site.</p></nav>
            <main>
              <p>Notre entreprise est spécialisée dans la menuiserie sur mesure depuis 1987, avec un savoir-faire artisanal transmis de génération en génération à Lyon.</p>
            </main>
            <a href="/qui-sommes-nous">Qui sommes nous</a>
            <a href="/mentions-legales">Mentions légales</a>
            <a href="https://ailleurs.fr/valeurs">Ext</a>
          </body>
        </html>
        "#;

        let mut result = SiteProbeResult::default();
        let links = harvest_page(
            html,
            "https://atelier-bois.fr",
            "https://atelier-bois.fr",
            "atelier-bois.fr",
            true,
            &mut result,
        );

        assert!(result.description.contains("menuiserie sur mesure"));
        assert_eq!(links, vec!["https://atelier-bois.fr/qui-sommes-nous"]);
    }

    #[test]
    fn falls_back_to_title_and_meta_description() {
        let html = r#"
        <html>
          <head>
            <title>Atelier Bois - Menuiserie à Lyon</title>
            <meta name="description" content="Menuiserie artisanale sur mesure à Lyon depuis 1987.">
          </head>
          <body><p>Accueil</p></body>
        </html>
        "#;

        let mut result = SiteProbeResult::default();
        harvest_page(
            html,
            "https://atelier-bois.fr",
            "https://atelier-bois.fr",
            "atelier-bois.fr",
            false,
            &mut result,
        );

        assert!(result.description.starts_with("Entreprise: Atelier Bois"));
        assert!(result.description.contains("Menuiserie artisanale"));
    }

    #[test]
    fn classifies_values_page_and_caps_results() {
        let html = r#"
        <html><body>
          <ul>
            <li>L'excellence artisanale avant tout</li>
            <li>Respect des délais annoncés</li>
            <li>Respect des délais annoncés</li>
            <li>court</li>
          </ul>
        </body></html>
        "#;

        let mut result = SiteProbeResult::default();
        harvest_page(
            html,
            "https://atelier-bois.fr/valeurs",
            "https://atelier-bois.fr",
            "atelier-bois.fr",
            false,
            &mut result,
        );

        result.values = result.values.into_iter().unique().take(5).collect();
        assert_eq!(
            result.values,
            vec![
                "L'excellence artisanale avant tout".to_string(),
                "Respect des délais annoncés".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_site_probes_to_empty_result_twice() {
        let prober = SiteProber::new(&probe_settings());

        let first = prober.probe("http://127.0.0.1:9/").await;
        let second = prober.probe("http://127.0.0.1:9/").await;

        assert_eq!(first, SiteProbeResult::default());
        assert_eq!(first, second);
    }
}
