use askama::Template;
use rand::seq::SliceRandom;

const INTRO_VARIANTS: [&str; 3] = [
    r#"
    <p>Bonjour,</p>

    <p>
      J'ai découvert avec intérêt le travail de <strong>{nom_entreprise}</strong> dans le domaine {categorie} et je me permets de vous contacter au sujet d'une opportunité de stage.
    </p>
    "#,
    r#"
    <p>Bonjour,</p>

    <p>
      Votre expertise en {categorie} m'a particulièrement impressionné, et c'est pourquoi je souhaite proposer ma candidature à <strong>{nom_entreprise}</strong> pour un stage en développement.
    </p>
    "#,
    r#"
    <p>Bonjour,</p>

    <p>
      Suite à mes recherches sur les entreprises innovantes en {categorie}, <strong>{nom_entreprise}</strong> a retenu toute mon attention, et je souhaiterais contribuer à vos projets dans le cadre d'un stage.
    </p>
    "#,
];

#[derive(Template)]
#[template(path = "email_body.html")]
struct EmailBodyTemplate<'a> {
    intro: &'a str,
}

/// Renders the HTML pitch with one of the intro variants picked at random.
pub fn render_email_body(company: &str, category: &str) -> String {
    let category = match category.is_empty() {
        true => "technologie",
        false => category,
    };

    let intro_template = INTRO_VARIANTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(INTRO_VARIANTS[0]);
    let intro = intro_template
        .replace("{nom_entreprise}", company)
        .replace("{categorie}", category);

    let template = EmailBodyTemplate { intro: &intro };
    match template.render() {
        Ok(html) => html,
        Err(e) => {
            log::error!("Failed to render the e-mail body: {}", e);
            String::new()
        }
    }
}
