use super::{ConfigLayer, FieldSources};

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Merge `overlay` into `base`, recording `layer` as the source of every
/// leaf the overlay sets.
///
/// Tables merge key by key. Scalars and arrays replace the base value.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                match base_table.get_mut(key) {
                    Some(base_val) => {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    },
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        record_leaves(overlay_val, &path, layer, sources);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            record_leaves(overlay, prefix, layer, sources);
        },
    }
}

/// Record every leaf under `val` as set by `layer`.
pub fn record_leaves(val: &toml::Value, prefix: &str, layer: ConfigLayer, sources: &mut FieldSources) {
    match val {
        toml::Value::Table(table) => {
            for (key, child) in table {
                record_leaves(child, &join(prefix, key), layer, sources);
            }
        },
        _ => {
            sources.insert(prefix.to_owned(), layer);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn test_missing_keys_keep_base() {
        let mut base = parse("[http]\nuser_agent = \"a\"\nmax_redirects = 10\n");
        let mut sources = FieldSources::new();
        record_leaves(&base, "", ConfigLayer::Defaults, &mut sources);

        deep_merge_tracking(
            &mut base,
            &parse("[http]\nmax_redirects = 0\n"),
            "",
            ConfigLayer::User,
            &mut sources,
        );

        assert_eq!(base["http"]["user_agent"].as_str(), Some("a"));
        assert_eq!(base["http"]["max_redirects"].as_integer(), Some(0));
        assert_eq!(sources["http.user_agent"], ConfigLayer::Defaults);
        assert_eq!(sources["http.max_redirects"], ConfigLayer::User);
    }

    #[test]
    fn test_arrays_replace() {
        let mut base = parse("[orchestrator]\nbootstrap = [\"a\", \"b\"]\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(
            &mut base,
            &parse("[orchestrator]\nbootstrap = [\"c\"]\n"),
            "",
            ConfigLayer::Workspace,
            &mut sources,
        );
        assert_eq!(base["orchestrator"]["bootstrap"].as_array().unwrap().len(), 1);
        assert_eq!(sources["orchestrator.bootstrap"], ConfigLayer::Workspace);
    }

    #[test]
    fn test_new_section_records_all_leaves() {
        let mut base = parse("[http]\nuser_agent = \"a\"\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(
            &mut base,
            &parse("[environment]\nglobals = [\"JSON\"]\n"),
            "",
            ConfigLayer::User,
            &mut sources,
        );
        assert_eq!(sources["environment.globals"], ConfigLayer::User);
    }
}
