//! Argument extraction - turns interaction options into typed values

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;

use crate::domain::entities::{
    ArgValue, ArgumentSpec, ArgumentType, CommandArgs, CommandOption, Interaction, OptionType, Resolved,
};

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<(?:@[!&]?|#)(\d{17,20})>$").expect("mention pattern is valid"));

/// Extracts one value per declared argument. Absent, mistyped or
/// unresolvable options become [`ArgValue::Empty`].
pub fn extract_arguments(specs: &[ArgumentSpec], interaction: &Interaction) -> CommandArgs {
    let mut args = CommandArgs::new();
    for spec in specs {
        let value = interaction
            .option(&spec.id)
            .and_then(|option| extract(spec.kind, option, &interaction.resolved))
            .unwrap_or(ArgValue::Empty);
        args.insert(spec.id.clone(), value);
    }
    args
}

fn extract(kind: ArgumentType, option: &CommandOption, resolved: &Resolved) -> Option<ArgValue> {
    let value = option.value.as_ref()?;
    match (kind, option.kind) {
        (ArgumentType::Boolean, OptionType::Boolean) => value.as_bool().map(ArgValue::Boolean),
        (ArgumentType::Integer, OptionType::Integer) => value.as_i64().map(ArgValue::Integer),
        (ArgumentType::Number, OptionType::Number | OptionType::Integer) => value.as_f64().map(ArgValue::Number),
        (ArgumentType::String, OptionType::String) => value.as_str().map(|s| ArgValue::String(s.to_string())),
        (ArgumentType::User, OptionType::User) => resolved.users.get(&entity_id(value)?).cloned().map(ArgValue::User),
        (ArgumentType::Member, OptionType::User) => {
            resolved.members.get(&entity_id(value)?).cloned().map(ArgValue::Member)
        }
        (ArgumentType::Role, OptionType::Role) => resolved.roles.get(&entity_id(value)?).cloned().map(ArgValue::Role),
        (ArgumentType::Channel, OptionType::Channel) => {
            resolved.channels.get(&entity_id(value)?).cloned().map(ArgValue::Channel)
        }
        (ArgumentType::Mentionable, OptionType::Mentionable | OptionType::User | OptionType::Role) => {
            let id = entity_id(value)?;
            resolved
                .users
                .get(&id)
                .or_else(|| resolved.members.get(&id))
                .or_else(|| resolved.roles.get(&id))
                .cloned()
                .map(ArgValue::Mentionable)
        }
        _ => None,
    }
}

/// Id carried by an entity option, unwrapping `<@id>`-style mentions
fn entity_id(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    match MENTION.captures(&raw) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()),
        None => Some(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::User;
    use serde_json::json;

    fn spec(id: &str, kind: ArgumentType) -> ArgumentSpec {
        ArgumentSpec::new(id, kind)
    }

    #[test]
    fn test_scalar_arguments() {
        let interaction = Interaction::command(User::new("1"), "roll")
            .with_option(CommandOption::new("sides", OptionType::Integer, 20))
            .with_option(CommandOption::new("loud", OptionType::Boolean, true))
            .with_option(CommandOption::new("label", OptionType::String, "d20"));

        let args = extract_arguments(
            &[
                spec("sides", ArgumentType::Integer),
                spec("loud", ArgumentType::Boolean),
                spec("label", ArgumentType::String),
                spec("weight", ArgumentType::Number),
            ],
            &interaction,
        );

        assert_eq!(args.get("sides").as_i64(), Some(20));
        assert_eq!(args.get("loud").as_bool(), Some(true));
        assert_eq!(args.get("label").as_str(), Some("d20"));
        assert!(args.get("weight").is_empty());
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_mismatched_type_is_empty() {
        let interaction = Interaction::command(User::new("1"), "roll")
            .with_option(CommandOption::new("sides", OptionType::String, "twenty"));

        let args = extract_arguments(&[spec("sides", ArgumentType::Integer)], &interaction);
        assert!(args.get("sides").is_empty());
    }

    #[test]
    fn test_entities_resolve_through_mentions() {
        let id = "123456789012345678";
        let mut resolved = Resolved::default();
        resolved.users.insert(id.to_string(), json!({ "id": id, "username": "alice" }));
        resolved.roles.insert("42".to_string(), json!({ "id": "42", "name": "mods" }));

        let interaction = Interaction::command(User::new("1"), "whois")
            .with_option(CommandOption::new("target", OptionType::User, format!("<@!{id}>")))
            .with_option(CommandOption::new("role", OptionType::Role, "42"))
            .with_option(CommandOption::new("who", OptionType::Mentionable, "99"))
            .with_resolved(resolved);

        let args = extract_arguments(
            &[
                spec("target", ArgumentType::User),
                spec("role", ArgumentType::Role),
                spec("who", ArgumentType::Mentionable),
            ],
            &interaction,
        );

        assert_eq!(args.get("target"), &ArgValue::User(json!({ "id": id, "username": "alice" })));
        assert!(matches!(args.get("role"), ArgValue::Role(_)));
        assert!(args.get("who").is_empty());
    }
}
