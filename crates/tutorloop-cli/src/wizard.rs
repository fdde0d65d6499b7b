//! Interactive prompts: the provider setup wizard, course choice and topic.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password, Select};
use tutorloop_engine::{suggested_models, Config, Course, KNOWN_PROVIDERS};

/// Walks the learner through picking a provider, key and model.
///
/// Returns `false` when the learner declines to save; `config` is left
/// untouched in that case.
pub fn configure(config: &mut Config) -> anyhow::Result<bool> {
    let theme = ColorfulTheme::default();

    let provider_index = Select::with_theme(&theme)
        .with_prompt("Provider")
        .items(&KNOWN_PROVIDERS[..])
        .default(provider_default(&config.active_provider))
        .interact()?;
    let provider = KNOWN_PROVIDERS[provider_index];
    let existing = config.providers.get(provider).cloned().unwrap_or_default();

    let has_key = !existing.api_key.is_empty();
    let prompt = if has_key {
        "API key (leave empty to keep the current one)"
    } else {
        "API key"
    };
    let entered = Password::with_theme(&theme)
        .with_prompt(prompt)
        .allow_empty_password(has_key)
        .interact()?;
    let api_key = resolve_api_key(entered, &existing.api_key);

    let models = suggested_models(provider);
    let model_index = Select::with_theme(&theme)
        .with_prompt("Model")
        .items(models)
        .default(model_default(models, &existing.model))
        .interact()?;

    let save = Confirm::with_theme(&theme)
        .with_prompt(format!("Save {provider} with model {}?", models[model_index]))
        .default(true)
        .interact()?;
    if save {
        config.set_provider(provider, api_key, models[model_index]);
    }
    Ok(save)
}

/// Asks which stored course to open.
pub fn choose_course(mut courses: Vec<Course>) -> anyhow::Result<Course> {
    let labels = course_labels(&courses);
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Choose Course")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(courses.swap_remove(index))
}

/// Asks for the topic of a new course.
pub fn topic() -> anyhow::Result<String> {
    let topic: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("What do you want to learn?")
        .interact_text()?;
    Ok(topic.trim().to_string())
}

fn course_labels(courses: &[Course]) -> Vec<String> {
    courses
        .iter()
        .map(|c| format!("{} (id: {})", c.title, c.id))
        .collect()
}

fn provider_default(active: &str) -> usize {
    KNOWN_PROVIDERS
        .iter()
        .position(|p| *p == active)
        .unwrap_or_default()
}

fn model_default(models: &[&str], current: &str) -> usize {
    models.iter().position(|m| *m == current).unwrap_or_default()
}

/// An empty entry keeps the stored key.
fn resolve_api_key(entered: String, existing: &str) -> String {
    if entered.trim().is_empty() {
        existing.to_string()
    } else {
        entered.trim().to_string()
    }
}
