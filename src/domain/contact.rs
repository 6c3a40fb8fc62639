use serde::Serialize;

/// One output row of the normalized contact file. Field order matches the
/// column order of the emitted CSV header.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichedContact {
    pub email: String,
    pub title: String,
    pub category: String,
    pub owner_id: String,
    pub owner_name: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub has_wheelchair_accessible_parking: String,
    pub address: String,
    pub website: String,
    pub phone: String,
    pub link: String,
    pub clean_link: String,
}

/// Company columns an outreach run needs from a normalized row.
#[derive(Debug, Clone, Default)]
pub struct CompanyInfo {
    pub title: String,
    pub category: String,
    pub city: String,
    pub country: String,
    pub website: String,
    pub phone: String,
}
