//! `maitre classify` — Run the classifier alone, no backend involved.

use maitre_config::AppConfig;
use maitre_pipeline::classifier_from_config;
use maitre_security::sanitize_input;

pub fn run(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let classifier = classifier_from_config(&config.classifier);
    let text = sanitize_input(text, config.output.max_input_chars);

    let result = classifier.classify(&text);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
