use serde::Deserialize;
use serde_json::Value;

/// Owner block carried by the source CSV as an embedded JSON object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

/// Postal address block carried by the source CSV as an embedded JSON object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Deserialize)]
struct RawOwner {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct RawAddress {
    #[serde(default)]
    street: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    postal_code: String,
    #[serde(default)]
    country: String,
}

#[derive(Deserialize)]
struct AboutSection {
    #[serde(default)]
    id: String,
    #[serde(default)]
    options: Vec<AboutOption>,
}

#[derive(Deserialize)]
struct AboutOption {
    #[serde(default)]
    name: String,
    #[serde(default)]
    enabled: bool,
}

/// Exports from the scraping tool double-escape the embedded JSON and
/// sometimes wrap it in an extra pair of quotes. Undo both before parsing.
pub fn clean_json_fragment(raw: &str) -> String {
    let unescaped = raw.replace("\\\"", "\"");
    match unescaped.len() >= 2 && unescaped.starts_with('"') && unescaped.ends_with('"') {
        true => unescaped[1..unescaped.len() - 1].to_string(),
        false => unescaped,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn parse_owner(raw: &str) -> Result<Owner, serde_json::Error> {
    if raw.is_empty() {
        return Ok(Owner::default());
    }

    let cleaned = clean_json_fragment(raw);
    let parsed: RawOwner = serde_json::from_str(&cleaned)?;

    Ok(Owner {
        id: value_to_string(&parsed.id),
        name: parsed.name.replace(" (propriétaire)", ""),
    })
}

pub fn parse_address(raw: &str) -> Result<PostalAddress, serde_json::Error> {
    if raw.is_empty() {
        return Ok(PostalAddress::default());
    }

    let cleaned = clean_json_fragment(raw);
    let parsed: RawAddress = serde_json::from_str(&cleaned)?;

    Ok(PostalAddress {
        street: parsed.street,
        city: parsed.city,
        postal_code: parsed.postal_code,
        country: parsed.country,
    })
}

/// Looks for the wheelchair-accessible-parking option inside the `about`
/// attribute list. Anything unparsable counts as "Non".
pub fn parse_amenities(raw: &str) -> &'static str {
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return "Non";
    }

    let cleaned = clean_json_fragment(raw);
    let sections: Vec<AboutSection> = match serde_json::from_str(&cleaned) {
        Ok(sections) => sections,
        Err(_) => return "Non",
    };

    let accessible = sections
        .iter()
        .filter(|section| section.id == "accessibility")
        .flat_map(|section| section.options.iter())
        .any(|option| option.name == "Parking accessible en fauteuil roulant" && option.enabled);

    match accessible {
        true => "Oui",
        false => "Non",
    }
}

/// Cuts a tracking link at the first `?` or `#`.
pub fn strip_link_params(link: &str) -> String {
    match link.find(['?', '#']) {
        Some(idx) => link[..idx].to_string(),
        None => link.to_string(),
    }
}
