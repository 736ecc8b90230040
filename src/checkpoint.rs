//! Human-readable reports of parameter names that did not match while loading a snapshot.

use std::collections::BTreeMap;

/// Message listing model parameters that the snapshot did not provide.
pub fn missing_parameters_message(keys: &[String]) -> String {
    report(
        "Some model parameters or buffers are not found in the checkpoint:",
        keys,
    )
}

/// Message listing snapshot entries that no model parameter consumed.
pub fn unexpected_parameters_message(keys: &[String]) -> String {
    report(
        "The checkpoint contains keys that are not used by the model:",
        keys,
    )
}

fn report(header: &str, keys: &[String]) -> String {
    let mut msg = String::from(header);
    for (module, params) in group_by_module(keys) {
        msg.push_str("\n  ");
        msg.push_str(module);
        msg.push_str(&group_to_str(&params));
    }
    msg
}

/// Group `a.b.c` names by their module path `a.b`, collecting the leaf names.
fn group_by_module(keys: &[String]) -> BTreeMap<&str, Vec<&str>> {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for key in keys {
        match key.rsplit_once('.') {
            Some((module, param)) => groups.entry(module).or_default().push(param),
            None => {
                groups.entry(key.as_str()).or_default();
            }
        }
    }
    groups
}

fn group_to_str(params: &[&str]) -> String {
    match params {
        [] => String::new(),
        [param] => format!(".{param}"),
        params => format!(".{{{}}}", params.join(", ")),
    }
}
