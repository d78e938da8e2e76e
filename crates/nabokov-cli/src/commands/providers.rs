//! Provider listing command.

use nabokov_provider::GenerationService;

pub fn run(service: &GenerationService) {
    let registry = service.registry();
    for key in registry.keys() {
        let marker = if key == service.provider_key() { "*" } else { " " };
        if let Some(provider) = registry.get(&key) {
            println!(
                "{marker} {key:<8} {:<18} default model: {}",
                provider.name(),
                provider.default_model()
            );
        }
    }
}
