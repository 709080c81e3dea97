//! Predicate factories by name.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::{ConfigError, PredicateDefinition};
use crate::routing::matcher::{
    AndMatcher, HeaderMatcher, HostMatcher, Matcher, MethodMatcher, NotMatcher, OrMatcher, PathMatcher,
    QueryMatcher, RemoteAddrMatcher, WeightMatcher,
};
use crate::routing::weight::WeightGroups;

/// State shared by the predicates of one route while it is built.
#[derive(Debug)]
pub struct PredicateContext<'a> {
    pub route_id: &'a str,
    pub weights: &'a mut WeightGroups,
}

pub type PredicateFactory =
    fn(&Map<String, Value>, &mut PredicateContext<'_>, &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError>;

/// Maps predicate names (`Path`, `Host`, …) to factories.
#[derive(Clone)]
pub struct PredicateRegistry {
    factories: HashMap<&'static str, PredicateFactory>,
}

impl std::fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("names", &self.names())
            .finish()
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(name: &str, args: &Map<String, Value>) -> Result<T, ConfigError> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|source| ConfigError::Args {
        name: name.to_string(),
        source,
    })
}

impl PredicateRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &'static str, factory: PredicateFactory) {
        self.factories.insert(name, factory);
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn build(
        &self,
        definition: &PredicateDefinition,
        context: &mut PredicateContext<'_>,
    ) -> Result<Box<dyn Matcher>, ConfigError> {
        let factory = self
            .factories
            .get(definition.name.as_str())
            .ok_or_else(|| ConfigError::Unknown {
                kind: "predicate",
                name: definition.name.clone(),
            })?;
        factory(&definition.args, context, self)
    }

    /// All definitions combined with AND.
    pub fn build_all(
        &self,
        definitions: &[PredicateDefinition],
        context: &mut PredicateContext<'_>,
    ) -> Result<Box<dyn Matcher>, ConfigError> {
        let mut matchers = definitions
            .iter()
            .map(|d| self.build(d, context))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(match matchers.len() {
            1 => matchers.remove(0),
            _ => Box::new(AndMatcher::new(matchers)),
        })
    }
}

#[derive(Deserialize)]
struct PatternArgs {
    #[serde(default)]
    patterns: Vec<String>,
    pattern: Option<String>,
    #[serde(default = "default_true")]
    match_trailing_slash: bool,
}

fn default_true() -> bool {
    true
}

impl PatternArgs {
    fn all(self) -> Vec<String> {
        self.pattern.into_iter().chain(self.patterns).collect()
    }
}

#[derive(Deserialize)]
struct MethodArgs {
    methods: Vec<String>,
}

#[derive(Deserialize)]
struct HeaderArgs {
    header: String,
    regexp: Option<String>,
}

#[derive(Deserialize)]
struct QueryArgs {
    param: String,
    regexp: Option<String>,
}

#[derive(Deserialize)]
struct RemoteAddrArgs {
    sources: Vec<String>,
}

#[derive(Deserialize)]
struct WeightArgs {
    group: String,
    weight: u32,
}

#[derive(Deserialize)]
struct CompositeArgs {
    predicates: Vec<PredicateDefinition>,
}

#[derive(Deserialize)]
struct NotArgs {
    predicate: PredicateDefinition,
}

fn path(args: &Map<String, Value>, _: &mut PredicateContext<'_>, _: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: PatternArgs = parse_args("Path", args)?;
    let trailing = args.match_trailing_slash;
    Ok(Box::new(PathMatcher::new(&args.all(), trailing)?))
}

fn host(args: &Map<String, Value>, _: &mut PredicateContext<'_>, _: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: PatternArgs = parse_args("Host", args)?;
    Ok(Box::new(HostMatcher::new(&args.all())?))
}

fn method(args: &Map<String, Value>, _: &mut PredicateContext<'_>, _: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: MethodArgs = parse_args("Method", args)?;
    Ok(Box::new(MethodMatcher::new(&args.methods)?))
}

fn header(args: &Map<String, Value>, _: &mut PredicateContext<'_>, _: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: HeaderArgs = parse_args("Header", args)?;
    Ok(Box::new(HeaderMatcher::new(&args.header, args.regexp.as_deref())?))
}

fn query(args: &Map<String, Value>, _: &mut PredicateContext<'_>, _: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: QueryArgs = parse_args("Query", args)?;
    Ok(Box::new(QueryMatcher::new(&args.param, args.regexp.as_deref())?))
}

fn remote_addr(
    args: &Map<String, Value>,
    _: &mut PredicateContext<'_>,
    _: &PredicateRegistry,
) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: RemoteAddrArgs = parse_args("RemoteAddr", args)?;
    Ok(Box::new(RemoteAddrMatcher::new(&args.sources)?))
}

fn weight(args: &Map<String, Value>, context: &mut PredicateContext<'_>, _: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: WeightArgs = parse_args("Weight", args)?;
    if args.group.is_empty() {
        return Err(ConfigError::invalid("Weight predicate", "group may not be empty"));
    }
    context.weights.add(args.group.clone(), context.route_id, args.weight);
    Ok(Box::new(WeightMatcher::new(args.group, context.route_id)))
}

fn composite(
    name: &str,
    args: &Map<String, Value>,
    context: &mut PredicateContext<'_>,
    registry: &PredicateRegistry,
) -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
    let args: CompositeArgs = parse_args(name, args)?;
    if args.predicates.is_empty() {
        return Err(ConfigError::invalid(format!("{} predicate", name), "predicates may not be empty"));
    }
    args.predicates.iter().map(|d| registry.build(d, context)).collect()
}

fn and(args: &Map<String, Value>, context: &mut PredicateContext<'_>, registry: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    Ok(Box::new(AndMatcher::new(composite("And", args, context, registry)?)))
}

fn or(args: &Map<String, Value>, context: &mut PredicateContext<'_>, registry: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    Ok(Box::new(OrMatcher::new(composite("Or", args, context, registry)?)))
}

fn not(args: &Map<String, Value>, context: &mut PredicateContext<'_>, registry: &PredicateRegistry) -> Result<Box<dyn Matcher>, ConfigError> {
    let args: NotArgs = parse_args("Not", args)?;
    Ok(Box::new(NotMatcher::new(registry.build(&args.predicate, context)?)))
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("Path", path);
        registry.register("Host", host);
        registry.register("Method", method);
        registry.register("Header", header);
        registry.register("Query", query);
        registry.register("RemoteAddr", remote_addr);
        registry.register("Weight", weight);
        registry.register("And", and);
        registry.register("Or", or);
        registry.register("Not", not);
        registry
    }
}
