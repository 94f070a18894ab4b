use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::{
    DbExpression, Error, PrimitiveTypeKind, Result, default_string_type_name,
    sqlgen::{
        SqlBuilder, SqlFragment, SqlGenerator,
        function_handler::{FunctionCall, FunctionHandler, wrap_with_cast},
    },
};

/// Coordinate system ids assumed when a constructor is given none.
const DEFAULT_GEOGRAPHY_SRID: i32 = 4326;
const DEFAULT_GEOMETRY_SRID: i32 = 0;

/// Translation tables of one spatial type.
struct SpatialFunctions {
    static_methods: HashMap<String, FunctionHandler>,
    instance_properties: HashMap<&'static str, &'static str>,
    renamed_instance_methods: HashMap<&'static str, &'static str>,
}

/// Instance methods both types spell the same way.
const SHARED_RENAMED_METHODS: [(&str, &str); 23] = [
    ("AsText", "STAsText"),
    ("AsBinary", "STAsBinary"),
    ("SpatialTypeName", "STGeometryType"),
    ("SpatialDimension", "STDimension"),
    ("IsEmptySpatial", "STIsEmpty"),
    ("SpatialEquals", "STEquals"),
    ("SpatialDisjoint", "STDisjoint"),
    ("SpatialIntersects", "STIntersects"),
    ("SpatialBuffer", "STBuffer"),
    ("Distance", "STDistance"),
    ("SpatialUnion", "STUnion"),
    ("SpatialIntersection", "STIntersection"),
    ("SpatialDifference", "STDifference"),
    ("SpatialSymmetricDifference", "STSymDifference"),
    ("SpatialElementCount", "STNumGeometries"),
    ("SpatialElementAt", "STGeometryN"),
    ("SpatialLength", "STLength"),
    ("StartPoint", "STStartPoint"),
    ("EndPoint", "STEndPoint"),
    ("IsClosedSpatial", "STIsClosed"),
    ("PointCount", "STNumPoints"),
    ("PointAt", "STPointN"),
    ("Area", "STArea"),
];

const GEOMETRY_ONLY_RENAMED_METHODS: [(&str, &str); 17] = [
    ("IsSimpleGeometry", "STIsSimple"),
    ("IsValidGeometry", "STIsValid"),
    ("SpatialBoundary", "STBoundary"),
    ("SpatialEnvelope", "STEnvelope"),
    ("SpatialTouches", "STTouches"),
    ("SpatialCrosses", "STCrosses"),
    ("SpatialWithin", "STWithin"),
    ("SpatialContains", "STContains"),
    ("SpatialOverlaps", "STOverlaps"),
    ("SpatialRelate", "STRelate"),
    ("SpatialConvexHull", "STConvexHull"),
    ("IsRing", "STIsRing"),
    ("Centroid", "STCentroid"),
    ("PointOnSurface", "STPointOnSurface"),
    ("ExteriorRing", "STExteriorRing"),
    ("InteriorRingCount", "STNumInteriorRing"),
    ("InteriorRingAt", "STInteriorRingN"),
];

/// Static constructors taking `(text or binary, srid)`, by canonical suffix.
const NAMED_CONSTRUCTORS: [(&str, &str); 14] = [
    ("PointFromText", "STPointFromText"),
    ("LineFromText", "STLineFromText"),
    ("PolygonFromText", "STPolyFromText"),
    ("MultiPointFromText", "STMPointFromText"),
    ("MultiLineFromText", "STMLineFromText"),
    ("MultiPolygonFromText", "STMPolyFromText"),
    ("CollectionFromText", "STGeomCollFromText"),
    ("PointFromBinary", "STPointFromWKB"),
    ("LineFromBinary", "STLineFromWKB"),
    ("PolygonFromBinary", "STPolyFromWKB"),
    ("MultiPointFromBinary", "STMPointFromWKB"),
    ("MultiLineFromBinary", "STMLineFromWKB"),
    ("MultiPolygonFromBinary", "STMPolyFromWKB"),
    ("CollectionFromBinary", "STGeomCollFromWKB"),
];

fn spatial_functions(geography: bool) -> SpatialFunctions {
    let prefix = if geography { "Geography" } else { "Geometry" };

    let mut static_methods: HashMap<String, FunctionHandler> = HashMap::new();
    static_methods.insert(format!("{prefix}FromText"), SqlGenerator::handle_spatial_from_text);
    static_methods.insert(format!("{prefix}FromBinary"), SqlGenerator::handle_spatial_from_binary);
    static_methods.insert(format!("{prefix}FromGml"), SqlGenerator::handle_spatial_from_gml);
    for (suffix, _) in NAMED_CONSTRUCTORS {
        static_methods.insert(format!("{prefix}{suffix}"), SqlGenerator::handle_named_constructor);
    }

    let instance_properties: HashMap<&'static str, &'static str> = if geography {
        [("CoordinateSystemId", "STSrid"), ("Latitude", "Lat"), ("Longitude", "Long"), ("Measure", "M"), ("Elevation", "Z")]
            .into_iter()
            .collect()
    } else {
        [("CoordinateSystemId", "STSrid"), ("Measure", "M"), ("XCoordinate", "STX"), ("YCoordinate", "STY"), ("Elevation", "Z")]
            .into_iter()
            .collect()
    };

    let mut renamed_instance_methods: HashMap<&'static str, &'static str> = SHARED_RENAMED_METHODS.into_iter().collect();
    if !geography {
        renamed_instance_methods.extend(GEOMETRY_ONLY_RENAMED_METHODS);
    }

    SpatialFunctions { static_methods, instance_properties, renamed_instance_methods }
}

static GEOGRAPHY_FUNCTIONS: Lazy<SpatialFunctions> = Lazy::new(|| spatial_functions(true));
static GEOMETRY_FUNCTIONS: Lazy<SpatialFunctions> = Lazy::new(|| spatial_functions(false));

fn type_prefix(call: &FunctionCall<'_>) -> &'static str {
    if call.result_type.is_primitive_kind(PrimitiveTypeKind::Geometry) { "geometry" } else { "geography" }
}

impl SqlGenerator {
    /// Canonical spatial functions: static constructors, instance properties
    /// or instance methods of the SQL Server CLR types.
    pub(super) fn visit_spatial_function(&mut self, call: &FunctionCall<'_>, kind: PrimitiveTypeKind) -> Result<SqlFragment> {
        let functions: &SpatialFunctions =
            if kind == PrimitiveTypeKind::Geography { &GEOGRAPHY_FUNCTIONS } else { &GEOMETRY_FUNCTIONS };
        let name = call.function.name.as_str();

        if let Some(handler) = functions.static_methods.get(name) {
            return handler(self, call);
        }
        if let Some(property) = functions.instance_properties.get(name) {
            return self.write_instance_function_call(call, property, true, None);
        }
        let method = functions.renamed_instance_methods.get(name).copied().unwrap_or(name);
        // The XML of AsGml is returned as a string.
        let cast_to = (method == "AsGml").then(|| default_string_type_name(self.version));
        self.write_instance_function_call(call, method, false, cast_to)
    }

    /// `instance.Name` or `instance.Name(args)`, the instance being the first argument.
    pub(super) fn write_instance_function_call(
        &mut self,
        call: &FunctionCall<'_>,
        name: &str,
        is_property_access: bool,
        cast_to: Option<&str>,
    ) -> Result<SqlFragment> {
        let (instance, rest) = call.arguments.split_first().ok_or_else(|| {
            Error::invalid_operation(format!("{} needs an instance argument", call.function.full_name()))
        })?;

        let mut body = SqlBuilder::new();
        if let DbExpression::Function { .. } = instance {
            body.append(self.visit(instance)?);
        } else {
            self.parenthesize_if_needed(instance, &mut body)?;
        }
        body.append(".");
        body.append(name.to_string());
        if !is_property_access {
            self.write_function_arguments(rest, &mut body)?;
        }
        Ok(wrap_with_cast(cast_to, body))
    }

    /// `GeographyPointFromText` and friends map one to one onto `ST` constructors.
    fn handle_named_constructor(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let suffix = call.function.name.trim_start_matches("Geography").trim_start_matches("Geometry");
        let method = NAMED_CONSTRUCTORS
            .iter()
            .find(|(s, _)| *s == suffix)
            .map(|(_, method)| *method)
            .ok_or_else(|| Error::invalid_operation(format!("{} is not a spatial constructor", call.function.full_name())))?;
        let name = format!("{}::{method}", type_prefix(call));
        self.handle_function_default_given_name(call, Some(&name))
    }

    /// `FromText` with an srid is `STGeomFromText`, without one `Parse`.
    fn handle_spatial_from_text(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let method = if call.arguments.len() == 2 { "STGeomFromText" } else { "Parse" };
        let name = format!("{}::{method}", type_prefix(call));
        self.handle_function_default_given_name(call, Some(&name))
    }

    fn handle_spatial_from_binary(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let name = format!("{}::STGeomFromWKB", type_prefix(call));
        self.handle_static_method_append_srid(call, &name)
    }

    fn handle_spatial_from_gml(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let name = format!("{}::GeomFromGml", type_prefix(call));
        self.handle_static_method_append_srid(call, &name)
    }

    /// Adds the default srid of the type when the call has none.
    fn handle_static_method_append_srid(&mut self, call: &FunctionCall<'_>, name: &str) -> Result<SqlFragment> {
        if call.arguments.len() == 2 {
            return self.handle_function_default_given_name(call, Some(name));
        }
        let srid = if call.result_type.is_primitive_kind(PrimitiveTypeKind::Geometry) {
            DEFAULT_GEOMETRY_SRID
        } else {
            DEFAULT_GEOGRAPHY_SRID
        };
        let srid = DbExpression::constant(srid);
        let mut result = SqlBuilder::text(name.to_string());
        self.write_function_arguments(call.arguments.iter().chain(std::iter::once(&srid)), &mut result)?;
        Ok(result.into())
    }
}
