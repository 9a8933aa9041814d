use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Session Models ============

/// Account kind returned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    Enterprise,
    Admin,
}

/// The authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnpj: Option<String>,
}

/// Snapshot of the shared session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub loading: bool,
}

impl Session {
    /// State at application start, before the session check resolves.
    pub fn initial() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }

    pub fn resolved(user: Option<User>) -> Self {
        Self {
            user,
            loading: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of a successful `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// `GET /auth/me` answers either with the bare user or wrapped in `{ "user": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WhoAmIResponse {
    Wrapped { user: User },
    Bare(User),
}

impl WhoAmIResponse {
    pub fn into_user(self) -> User {
        match self {
            WhoAmIResponse::Wrapped { user } => user,
            WhoAmIResponse::Bare(user) => user,
        }
    }
}

// ============ Form Models ============

/// Form fields the lookup hooks are allowed to autofill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormField {
    Name,
    TradeName,
    Email,
    Phone,
    Address,
    Number,
    Complement,
    District,
    City,
    State,
    ZipCode,
}

impl FormField {
    /// Key used by the form layer for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormField::Name => "name",
            FormField::TradeName => "tradeName",
            FormField::Email => "email",
            FormField::Phone => "phone",
            FormField::Address => "address",
            FormField::Number => "number",
            FormField::Complement => "complement",
            FormField::District => "district",
            FormField::City => "city",
            FormField::State => "state",
            FormField::ZipCode => "zipCode",
        }
    }
}

/// Address data ready to be copied into a form. Absent fields are left
/// untouched in the form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressAutofill {
    pub address: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl AddressAutofill {
    /// Present, non-blank fields in form order.
    pub fn fields(&self) -> Vec<(FormField, &str)> {
        present(&[
            (FormField::Address, &self.address),
            (FormField::Number, &self.number),
            (FormField::Complement, &self.complement),
            (FormField::District, &self.district),
            (FormField::City, &self.city),
            (FormField::State, &self.state),
            (FormField::ZipCode, &self.zip_code),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// Company record normalised from a CNPJ lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    pub cnpj: String,
    pub name: Option<String>,
    pub trade_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: AddressAutofill,
}

impl CompanyRecord {
    pub fn fields(&self) -> Vec<(FormField, &str)> {
        let mut fields = present(&[
            (FormField::Name, &self.name),
            (FormField::TradeName, &self.trade_name),
            (FormField::Email, &self.email),
            (FormField::Phone, &self.phone),
        ]);
        fields.extend(self.address.fields());
        fields
    }
}

fn present<'a>(candidates: &[(FormField, &'a Option<String>)]) -> Vec<(FormField, &'a str)> {
    candidates
        .iter()
        .filter_map(|(field, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (*field, v))
        })
        .collect()
}

// ============ External Lookup Payloads ============

/// Postal-code service response.
#[derive(Debug, Clone, Deserialize)]
pub struct CepApiResponse {
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Tax-ID service response. Field names follow the Receita Federal layout.
#[derive(Debug, Clone, Deserialize)]
pub struct CnpjApiResponse {
    #[serde(default)]
    pub razao_social: Option<String>,
    #[serde(default)]
    pub nome_fantasia: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ddd_telefone_1: Option<String>,
    #[serde(default)]
    pub logradouro: Option<String>,
    #[serde(default)]
    pub numero: Option<String>,
    #[serde(default)]
    pub complemento: Option<String>,
    #[serde(default)]
    pub bairro: Option<String>,
    #[serde(default)]
    pub municipio: Option<String>,
    #[serde(default)]
    pub uf: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
}

// ============ Admin Statistics ============

/// Counters shown on the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminStats {
    pub total_enterprises: u64,
    pub active_enterprises: u64,
    pub total_users: u64,
    pub total_transactions: u64,
    pub total_clients: u64,
    pub total_suppliers: u64,
    pub total_products: u64,
}

/// Latest stats together with the moment they were fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminStatsSnapshot {
    pub stats: AdminStats,
    pub fetched_at: DateTime<Utc>,
}
