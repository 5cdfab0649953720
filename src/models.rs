use serde::{Deserialize, Serialize};

// Contact form body. Missing or null fields are caught by validation;
// anything else the form posts (e.g. a captcha token) is ignored.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub budget: Option<String>,
    pub services: Option<Vec<String>>,
    pub message: Option<String>,
}

fn filled(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ContactForm {
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.email, &self.message]
            .into_iter()
            .all(|field| filled(field).is_some())
    }

    pub fn name(&self) -> &str {
        filled(&self.name).unwrap_or_default()
    }

    pub fn email(&self) -> &str {
        filled(&self.email).unwrap_or_default()
    }

    pub fn services(&self) -> &[String] {
        self.services.as_deref().unwrap_or_default()
    }

    // "Services: a, b\nBudget: X" prefilled into the scheduling link
    pub fn notes(&self) -> String {
        let services = match self.services() {
            [] => "N/A".to_string(),
            list => list.join(", "),
        };
        let budget = filled(&self.budget).unwrap_or("N/A");
        format!("Services: {services}\nBudget: {budget}")
    }
}

// Success reply
#[derive(Serialize, Debug)]
pub struct ContactReply {
    pub ok: bool,
    #[serde(rename = "calLink")]
    pub cal_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_incomplete() {
        let form = ContactForm {
            name: Some("Ada".into()),
            email: Some("  ".into()),
            message: Some("hi".into()),
            ..Default::default()
        };
        assert!(!form.is_complete());
    }

    #[test]
    fn notes_fill_in_missing_values() {
        let form: ContactForm =
            serde_json::from_str(r#"{"name":"Ada","email":"a@b.c","message":"hi","cfToken":"x"}"#)
                .unwrap();
        assert!(form.is_complete());
        assert_eq!(form.notes(), "Services: N/A\nBudget: N/A");

        let form = ContactForm {
            services: Some(vec!["Web".into(), "SEO".into()]),
            budget: Some("5k".into()),
            ..form
        };
        assert_eq!(form.notes(), "Services: Web, SEO\nBudget: 5k");
    }
}
