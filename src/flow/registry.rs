use super::record::NodeRecord;
use crate::backend::ScriptEngine;
use crate::error::FlowError;
use crate::interpreter::Interpreter;
use crate::node::{
    int_field, str_field, AssertNode, DateNode, DynamicWindowedMemoryNode, EnvNode, Fields,
    FunctionNode, HistoryNode, InitNode, InputNode, InputProvider, MemoryNode, NoInput, Node,
    PromptNode, RandomNode, RegexNode, StartNode, TagNode, TextData, WindowedMemoryNode,
};
use crate::state::Role;
use ahash::AHashMap;
use std::sync::Arc;

/// Everything a factory may need to build a node from its persisted record.
pub struct FactoryContext<'a> {
    pub id: &'a str,
    pub fields: &'a Fields,
    pub scripts: &'a Arc<dyn ScriptEngine>,
    pub input: &'a Arc<dyn InputProvider>,
}

impl FactoryContext<'_> {
    fn text_data(&self, key: &str) -> Result<TextData, FlowError> {
        match self.fields.get(key) {
            None | Some(serde_json::Value::Null) => Ok(TextData::default()),
            Some(serde_json::Value::String(text)) => Ok(TextData::new(key, text.clone())),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| self.invalid(key, e.to_string()))
            }
        }
    }

    fn int(&self, key: &str, default: i64) -> Result<i64, FlowError> {
        int_field(self.fields, key)
            .unwrap_or(Ok(default))
            .map_err(|message| self.invalid(key, message))
    }

    fn invalid(&self, field: &str, message: impl Into<String>) -> FlowError {
        FlowError::InvalidField {
            id: self.id.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Builds one kind of node from persisted fields.
pub trait NodeFactory: Send + Sync {
    fn classname(&self) -> &str;
    fn build(&self, ctx: &FactoryContext<'_>) -> Result<Arc<dyn Node>, FlowError>;
}

// Generates a factory struct per built-in node kind, plus the lookup helpers.
macro_rules! define_node_factories {
    ( $( ($struct_name:ident, $classname:literal, |$ctx:ident| $body:expr) ),* $(,)? ) => {
        $(
            struct $struct_name;
            impl NodeFactory for $struct_name {
                fn classname(&self) -> &str { $classname }
                #[allow(unused_variables)]
                fn build(&self, $ctx: &FactoryContext<'_>) -> Result<Arc<dyn Node>, FlowError> {
                    let node = $body?;
                    Ok(Arc::new(node))
                }
            }
        )*

        fn register_default_factories(registry: &mut AHashMap<String, Arc<dyn NodeFactory>>) {
            $( registry.insert($classname.to_string(), Arc::new($struct_name)); )*
        }

        fn create_factory_by_name(name: &str) -> Option<Arc<dyn NodeFactory>> {
            match name {
                $( $classname => Some(Arc::new($struct_name)), )*
                _ => None,
            }
        }
    };
}

define_node_factories! {
    (StartFactory, "StartNode", |ctx| Ok::<_, FlowError>(StartNode)),
    (InitFactory, "InitNode", |ctx| Ok::<_, FlowError>(InitNode::new())),
    (FunctionFactory, "FuncNode", |ctx| ctx
        .text_data("func")
        .map(|func| FunctionNode::new(func, Arc::clone(ctx.scripts)))),
    (AssertFactory, "AssertNode", |ctx| ctx
        .text_data("assertion")
        .map(|assertion| AssertNode::new(assertion, Arc::clone(ctx.scripts)))),
    (PromptFactory, "PromptNode", |ctx| ctx.text_data("prompt").map(PromptNode::new)),
    (InputFactory, "InputNode", |ctx| Ok::<_, FlowError>(InputNode::new(Arc::clone(ctx.input)))),
    (DateFactory, "DateNode", |ctx| Ok::<_, FlowError>(DateNode::new(str_field(
        ctx.fields,
        "datetime_format",
        DateNode::DEFAULT_FORMAT,
    )))),
    (RandomFactory, "RandomNode", |ctx| ctx
        .int("min", 0)
        .and_then(|min| ctx.int("max", 100).map(|max| RandomNode::new(min, max)))),
    (HistoryFactory, "HistoryNode", |ctx| {
        let role = str_field(ctx.fields, "role", "user");
        Role::parse(&role)
            .map(HistoryNode::new)
            .ok_or_else(|| ctx.invalid("role", format!("unknown role '{}'", role)))
    }),
    (MemoryFactory, "MemoryNode", |ctx| Ok::<_, FlowError>(MemoryNode)),
    (WindowedMemoryFactory, "WindowedMemoryNode", |ctx| ctx
        .int("window", WindowedMemoryNode::DEFAULT_WINDOW as i64)
        .and_then(|window| {
            usize::try_from(window)
                .map(WindowedMemoryNode::new)
                .map_err(|_| ctx.invalid("window", "must not be negative"))
        })),
    (DynamicWindowedMemoryFactory, "DynamicWindowedMemoryNode", |ctx| Ok::<_, FlowError>(
        DynamicWindowedMemoryNode::new(str_field(ctx.fields, "target", ""), Arc::clone(ctx.scripts))
    )),
    (RegexFactory, "RegexNode", |ctx| RegexNode::new(&str_field(ctx.fields, "regex", ""))
        .map_err(|e| ctx.invalid("regex", e.to_string()))),
    (TagFactory, "TagNode", |ctx| Ok::<_, FlowError>(TagNode::new(
        str_field(ctx.fields, "start_tag", ""),
        str_field(ctx.fields, "end_tag", ""),
    ))),
    (EnvFactory, "EnvNode", |ctx| Ok::<_, FlowError>(EnvNode::new(
        str_field(ctx.fields, "key", ""),
        str_field(ctx.fields, "default", ""),
    ))),
}

/// Maps persisted classnames to node factories and carries the capabilities injected into
/// the nodes it builds.
pub struct NodeRegistry {
    factories: AHashMap<String, Arc<dyn NodeFactory>>,
    scripts: Arc<dyn ScriptEngine>,
    input: Arc<dyn InputProvider>,
}

pub struct NodeRegistryBuilder {
    factories: AHashMap<String, Arc<dyn NodeFactory>>,
    scripts: Arc<dyn ScriptEngine>,
    input: Arc<dyn InputProvider>,
}

impl NodeRegistryBuilder {
    pub fn new() -> Self {
        let mut factories = AHashMap::new();
        register_default_factories(&mut factories);
        Self {
            factories,
            scripts: Arc::new(Interpreter::new()),
            input: Arc::new(NoInput),
        }
    }

    /// Lets documents use `user_classname` for one of the built-in kinds.
    pub fn with_type_alias(mut self, user_classname: &str, builtin_classname: &str) -> Self {
        if let Some(factory) = create_factory_by_name(builtin_classname) {
            self.factories.insert(user_classname.to_string(), factory);
        }
        self
    }

    pub fn with_factory(mut self, factory: Arc<dyn NodeFactory>) -> Self {
        self.factories
            .insert(factory.classname().to_string(), factory);
        self
    }

    pub fn with_script_engine(mut self, scripts: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_input_provider(mut self, input: Arc<dyn InputProvider>) -> Self {
        self.input = input;
        self
    }

    pub fn build(self) -> NodeRegistry {
        NodeRegistry {
            factories: self.factories,
            scripts: self.scripts,
            input: self.input,
        }
    }
}

impl Default for NodeRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn builder() -> NodeRegistryBuilder {
        NodeRegistryBuilder::new()
    }

    pub fn scripts(&self) -> Arc<dyn ScriptEngine> {
        Arc::clone(&self.scripts)
    }

    pub fn input_provider(&self) -> Arc<dyn InputProvider> {
        Arc::clone(&self.input)
    }

    pub fn contains(&self, classname: &str) -> bool {
        self.factories.contains_key(classname)
    }

    pub fn build_node(&self, record: &NodeRecord) -> Result<Arc<dyn Node>, FlowError> {
        let factory =
            self.factories
                .get(&record.classname)
                .ok_or_else(|| FlowError::UnknownNodeClass {
                    id: record.id.clone(),
                    classname: record.classname.clone(),
                })?;
        factory.build(&FactoryContext {
            id: &record.id,
            fields: &record.fields,
            scripts: &self.scripts,
            input: &self.input,
        })
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        NodeRegistryBuilder::new().build()
    }
}
