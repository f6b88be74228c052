//! String template rendering utilities.

pub struct TemplateVars;

impl TemplateVars {
    pub const PRODUCT: &'static str = "product";
}

pub fn render(template: &str, variables: &[(&str, &str)]) -> String {
    let mut result = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    result
}
