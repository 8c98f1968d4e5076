use num_enum::TryFromPrimitive;

/// Tag of a tree node. Which slots are legal to read or
/// write is entirely determined by this tag; see `Kind::has_*`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Kind {
    Entity = 1,
    Arch = 2,
    Package = 3,
    PackBody = 4,
    Elab = 5,

    PortDecl = 6,
    SignalDecl = 7,
    VarDecl = 8,
    ConstDecl = 9,
    TypeDecl = 10,
    FuncDecl = 11,
    FuncBody = 12,
    ProcDecl = 13,
    ProcBody = 14,
    Alias = 15,
    FileDecl = 16,
    Genvar = 17,
    EnumLit = 18,

    Literal = 19,
    Ref = 20,
    FCall = 21,
    Aggregate = 22,
    ArrayRef = 23,
    ArraySlice = 24,
    Qualified = 25,
    Open = 26,
    Param = 27,

    Process = 28,
    Wait = 29,
    VarAssign = 30,
    SignalAssign = 31,
    Assert = 32,
    Block = 33,
    Instance = 34,
    ForGenerate = 35,
    IfGenerate = 36,
}

impl Kind {
    pub fn is_top_level(self) -> bool {
        matches!(
            self,
            Kind::Arch | Kind::Entity | Kind::Package | Kind::PackBody | Kind::Elab
        )
    }

    pub fn is_decl(self) -> bool {
        matches!(
            self,
            Kind::PortDecl
                | Kind::SignalDecl
                | Kind::VarDecl
                | Kind::TypeDecl
                | Kind::ConstDecl
                | Kind::FuncDecl
                | Kind::FuncBody
                | Kind::ProcDecl
                | Kind::ProcBody
                | Kind::Alias
                | Kind::FileDecl
                | Kind::Genvar
        )
    }

    pub fn is_expr(self) -> bool {
        matches!(
            self,
            Kind::FCall
                | Kind::Literal
                | Kind::Ref
                | Kind::Qualified
                | Kind::Aggregate
                | Kind::ArrayRef
                | Kind::ArraySlice
        )
    }

    pub fn is_stmt(self) -> bool {
        matches!(
            self,
            Kind::Process
                | Kind::Wait
                | Kind::VarAssign
                | Kind::SignalAssign
                | Kind::Assert
                | Kind::Block
                | Kind::Instance
                | Kind::ForGenerate
                | Kind::IfGenerate
        )
    }

    pub fn has_ident(self) -> bool {
        matches!(
            self,
            Kind::Entity
                | Kind::PortDecl
                | Kind::FCall
                | Kind::Arch
                | Kind::SignalDecl
                | Kind::VarDecl
                | Kind::Ref
                | Kind::TypeDecl
                | Kind::Package
                | Kind::PackBody
                | Kind::Qualified
                | Kind::EnumLit
                | Kind::ConstDecl
                | Kind::FuncDecl
                | Kind::FuncBody
                | Kind::ProcDecl
                | Kind::ProcBody
                | Kind::Alias
                | Kind::FileDecl
                | Kind::Genvar
                | Kind::Elab
                | Kind::Param
        ) || self.is_stmt()
    }

    pub fn has_ident2(self) -> bool {
        matches!(self, Kind::Arch | Kind::Instance)
    }

    pub fn has_ports(self) -> bool {
        matches!(self, Kind::Entity | Kind::FuncDecl)
    }

    /// `Entity`'s formal generic declarations, or `Instance`'s actual
    /// generic-map association list.
    pub fn has_generics(self) -> bool {
        matches!(self, Kind::Entity | Kind::Instance)
    }

    pub fn has_type(self) -> bool {
        matches!(
            self,
            Kind::PortDecl
                | Kind::SignalDecl
                | Kind::VarDecl
                | Kind::TypeDecl
                | Kind::EnumLit
                | Kind::ConstDecl
                | Kind::FuncDecl
                | Kind::FuncBody
        ) || self.is_expr()
    }

    /// `FCall`'s/`Instance`'s actual argument list, or `ArrayRef`'s index
    /// expression (held as a single-element list for symmetry with
    /// `FCall`, since a multi-dimensional index is just several of them).
    pub fn has_params(self) -> bool {
        matches!(self, Kind::FCall | Kind::Instance | Kind::ArrayRef)
    }

    pub fn has_decls(self) -> bool {
        matches!(
            self,
            Kind::Arch | Kind::Process | Kind::Package | Kind::PackBody | Kind::Elab | Kind::Block | Kind::ForGenerate
        )
    }

    pub fn has_stmts(self) -> bool {
        matches!(self, Kind::Arch | Kind::Process | Kind::Elab | Kind::Block | Kind::ForGenerate)
    }

    pub fn has_delay(self) -> bool {
        matches!(self, Kind::Wait)
    }

    pub fn has_target(self) -> bool {
        matches!(self, Kind::VarAssign | Kind::SignalAssign)
    }

    pub fn has_value(self) -> bool {
        self.is_decl()
            || matches!(
                self,
                Kind::VarAssign
                    | Kind::SignalAssign
                    | Kind::Qualified
                    | Kind::Assert
                    | Kind::ArrayRef
                    | Kind::ArraySlice
                    | Kind::Instance
                    | Kind::Param
            )
    }

    pub fn has_context(self) -> bool {
        matches!(self, Kind::Arch | Kind::Entity | Kind::Package | Kind::Elab)
    }

    pub fn has_ref(self) -> bool {
        matches!(self, Kind::Ref | Kind::FCall | Kind::Instance | Kind::ForGenerate)
    }

    pub fn has_message(self) -> bool {
        matches!(self, Kind::Assert)
    }

    pub fn has_severity(self) -> bool {
        matches!(self, Kind::Assert)
    }

    pub fn has_range(self) -> bool {
        matches!(self, Kind::ArraySlice | Kind::ForGenerate | Kind::Param)
    }

    pub fn has_genvar(self) -> bool {
        matches!(self, Kind::ForGenerate)
    }
}
