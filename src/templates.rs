use minijinja::{context, Environment};

use crate::error::Result;
use crate::models::SummaryOutcome;

/// Page templates compiled into the binary.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("../templates/base.html"))?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        env.add_template("summary.html", include_str!("../templates/summary.html"))?;
        env.add_template("error.html", include_str!("../templates/error.html"))?;
        Ok(Self { env })
    }

    pub fn render_index(&self) -> Result<String> {
        Ok(self.env.get_template("index.html")?.render(context! {})?)
    }

    pub fn render_summary(&self, url: &str, summaries: &[SummaryOutcome]) -> Result<String> {
        Ok(self
            .env
            .get_template("summary.html")?
            .render(context! { url => url, summaries => summaries })?)
    }

    pub fn render_error(&self, message: &str) -> Result<String> {
        Ok(self
            .env
            .get_template("error.html")?
            .render(context! { message => message })?)
    }
}
