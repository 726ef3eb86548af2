use crate::cli::ConfigAction;
use unionlayer::config::{get_config_path, load_config};
use unionlayer::Result;

pub fn handle_config_command(action: Option<ConfigAction>) -> Result<()> {
    match action {
        Some(ConfigAction::Path) => {
            let config_path = get_config_path()?;
            println!("Config location: {}", config_path.display());
        }
        None | Some(ConfigAction::Show) => {
            let config_path = get_config_path()?;
            let config = load_config()?;
            println!("Config file: {}", config_path.display());
            println!();
            println!("Current configuration:");
            println!("  Engine:");
            println!("    remove_policy: {}", config.engine.remove_policy);
            println!(
                "    reclaim_interval_ms: {}",
                config.engine.get_reclaim_interval_ms()
            );
            println!("  Log:");
            println!("    filter: {}", config.log.get_filter());
        }
    }
    Ok(())
}
