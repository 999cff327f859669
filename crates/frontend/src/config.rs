use ir::Type;

#[derive(Debug, Clone)]
pub struct FrontendConfig {
    /// Carry arguments and locals as block parameters, so every store defines
    /// a fresh SSA value. Otherwise each one lives in an `alloca` slot created
    /// by the entry block and is accessed with `load`/`store`.
    pub promote_locals: bool,
    /// The type of `LdNull`.
    pub null_type: Type,
    /// The type of `LdStr`.
    pub string_type: Type,
}

impl FrontendConfig {
    pub fn with_promote_locals(mut self, promote: bool) -> Self {
        self.promote_locals = promote;
        self
    }

    pub fn with_null_type(mut self, ty: Type) -> Self {
        self.null_type = ty;
        self
    }

    pub fn with_string_type(mut self, ty: Type) -> Self {
        self.string_type = ty;
        self
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            promote_locals: true,
            null_type: Type::named("Object"),
            string_type: Type::named("String"),
        }
    }
}
