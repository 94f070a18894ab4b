use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::{
    ConstantValue, DbExpression, EdmFunction, Error, PrimitiveTypeKind, Result, StoreType, TypeUsage,
    sqlgen::{
        SqlBuilder, SqlFragment, SqlGenerator, quote_identifier,
        non_unicode::{match_source_pattern, match_target_pattern},
    },
};

/// A function application being translated.
pub(super) struct FunctionCall<'a> {
    pub(super) function: &'a EdmFunction,
    pub(super) arguments: &'a [DbExpression],
    pub(super) result_type: &'a TypeUsage,
}

impl FunctionCall<'_> {
    fn argument(&self, index: usize) -> Result<&DbExpression> {
        self.arguments.get(index).ok_or_else(|| {
            Error::invalid_operation(format!("{} expects at least {} arguments", self.function.full_name(), index + 1))
        })
    }

    fn any_argument_of_kind(&self, kind: PrimitiveTypeKind) -> bool {
        self.arguments.iter().any(|a| a.result_type().is_primitive_kind(kind))
    }
}

pub(super) type FunctionHandler = fn(&mut SqlGenerator, &FunctionCall<'_>) -> Result<SqlFragment>;

/// Escape character of LIKE patterns built from constants.
const LIKE_ESCAPE_CHAR: char = '~';

static CANONICAL_HANDLERS: Lazy<HashMap<&'static str, FunctionHandler>> = Lazy::new(|| {
    let mut handlers: HashMap<&'static str, FunctionHandler> = HashMap::new();
    handlers.insert("IndexOf", |g, c| g.handle_function_default_given_name(c, Some("CHARINDEX")));
    handlers.insert("Length", |g, c| g.handle_function_default_given_name(c, Some("LEN")));
    handlers.insert("NewGuid", |g, c| g.handle_function_default_given_name(c, Some("NEWID")));
    handlers.insert("ToLower", |g, c| g.handle_function_default_given_name(c, Some("LOWER")));
    handlers.insert("ToUpper", |g, c| g.handle_function_default_given_name(c, Some("UPPER")));
    handlers.insert("Round", |g, c| g.handle_round_or_truncate(c, true));
    handlers.insert("Truncate", |g, c| g.handle_round_or_truncate(c, false));
    handlers.insert("Abs", SqlGenerator::handle_abs);
    handlers.insert("Trim", SqlGenerator::handle_trim);
    handlers.insert("Contains", SqlGenerator::handle_string_predicate);
    handlers.insert("StartsWith", SqlGenerator::handle_string_predicate);
    handlers.insert("EndsWith", SqlGenerator::handle_string_predicate);
    for name in ["Year", "Month", "Day", "Hour", "Minute", "Second", "Millisecond", "DayOfYear"] {
        handlers.insert(name, |g, c| {
            let datepart = c.function.name.to_lowercase();
            g.handle_datepart(c, &datepart)
        });
    }
    handlers.insert("GetTotalOffsetMinutes", |g, c| g.handle_datepart(c, "tzoffset"));
    handlers.insert("CurrentDateTime", |g, c| g.handle_given_name_by_version(c, "GetDate", "SysDateTime"));
    handlers.insert("CurrentUtcDateTime", |g, c| g.handle_given_name_by_version(c, "GetUtcDate", "SysUtcDateTime"));
    handlers.insert("CurrentDateTimeOffset", |g, c| {
        g.require_katmai("CurrentDateTimeOffset")?;
        g.handle_function_default_given_name(c, Some("SysDateTimeOffset"))
    });
    handlers.insert("CreateDateTime", |g, c| {
        let type_name = if g.version.is_pre_katmai() { "datetime" } else { "datetime2" };
        g.handle_date_time_creation(c, type_name, true, false)
    });
    handlers.insert("CreateDateTimeOffset", |g, c| {
        g.require_katmai("CreateDateTimeOffset")?;
        g.handle_date_time_creation(c, "datetimeoffset", true, true)
    });
    handlers.insert("CreateTime", |g, c| {
        g.require_katmai("CreateTime")?;
        g.handle_date_time_creation(c, "time", false, false)
    });
    handlers.insert("TruncateTime", SqlGenerator::handle_truncate_time);
    for &name in DATE_ADD_PARTS.keys() {
        handlers.insert(name, SqlGenerator::handle_date_add);
    }
    for &name in DATE_DIFF_PARTS.keys() {
        handlers.insert(name, SqlGenerator::handle_date_diff);
    }
    handlers.insert("Concat", |g, c| g.handle_function_to_operator(c, false));
    for name in ["BitwiseAnd", "BitwiseNot", "BitwiseOr", "BitwiseXor"] {
        handlers.insert(name, |g, c| g.handle_function_to_operator(c, true));
    }
    handlers
});

static STORE_HANDLERS: Lazy<HashMap<&'static str, FunctionHandler>> = Lazy::new(|| {
    let mut handlers: HashMap<&'static str, FunctionHandler> = HashMap::new();
    handlers.insert("CONCAT", |g, c| g.handle_function_to_operator(c, false));
    for name in ["DATEADD", "DATEDIFF", "DATENAME", "DATEPART"] {
        handlers.insert(name, SqlGenerator::handle_datepart_store_function);
    }
    handlers.insert("POINTGEOGRAPHY", |g, c| g.handle_function_default_given_name(c, Some("geography::Point")));
    handlers.insert("POINTGEOMETRY", |g, c| g.handle_function_default_given_name(c, Some("geometry::Point")));
    handlers.insert("ASTEXTZM", |g, c| g.write_instance_function_call(c, "AsTextZM", false, None));
    handlers.insert("BUFFERWITHTOLERANCE", |g, c| g.write_instance_function_call(c, "BufferWithTolerance", false, None));
    handlers.insert("ENVELOPEANGLE", |g, c| g.write_instance_function_call(c, "EnvelopeAngle", false, None));
    handlers.insert("ENVELOPECENTER", |g, c| g.write_instance_function_call(c, "EnvelopeCenter", false, None));
    handlers.insert("INSTANCEOF", |g, c| g.write_instance_function_call(c, "InstanceOf", false, None));
    handlers.insert("FILTER", |g, c| g.write_instance_function_call(c, "Filter", false, None));
    handlers.insert("MAKEVALID", |g, c| g.write_instance_function_call(c, "MakeValid", false, None));
    handlers.insert("REDUCE", |g, c| g.write_instance_function_call(c, "Reduce", false, None));
    handlers.insert("NUMRINGS", |g, c| g.write_instance_function_call(c, "NumRings", false, None));
    handlers.insert("RINGN", |g, c| g.write_instance_function_call(c, "RingN", false, None));
    handlers
});

static OPERATORS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [("Concat", "+"), ("CONCAT", "+"), ("BitwiseAnd", "&"), ("BitwiseNot", "~"), ("BitwiseOr", "|"), ("BitwiseXor", "^")]
        .into_iter()
        .collect()
});

static DATE_ADD_PARTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("AddYears", "year"),
        ("AddMonths", "month"),
        ("AddDays", "day"),
        ("AddHours", "hour"),
        ("AddMinutes", "minute"),
        ("AddSeconds", "second"),
        ("AddMilliseconds", "millisecond"),
        ("AddMicroseconds", "microsecond"),
        ("AddNanoseconds", "nanosecond"),
    ]
    .into_iter()
    .collect()
});

static DATE_DIFF_PARTS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("DiffYears", "year"),
        ("DiffMonths", "month"),
        ("DiffDays", "day"),
        ("DiffHours", "hour"),
        ("DiffMinutes", "minute"),
        ("DiffSeconds", "second"),
        ("DiffMilliseconds", "millisecond"),
        ("DiffMicroseconds", "microsecond"),
        ("DiffNanoseconds", "nanosecond"),
    ]
    .into_iter()
    .collect()
});

/// Datepart keywords accepted by DATEADD, DATEDIFF, DATENAME and DATEPART, lower case.
static DATEPART_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "year", "yy", "yyyy", "quarter", "qq", "q", "month", "mm", "m", "dayofyear", "dy", "y", "day", "dd", "d",
        "week", "wk", "ww", "weekday", "dw", "w", "hour", "hh", "minute", "mi", "n", "second", "ss", "s",
        "millisecond", "ms", "microsecond", "mcs", "nanosecond", "ns", "tzoffset", "tz", "iso_week", "isoww", "isowk",
    ]
    .into_iter()
    .collect()
});

/// Functions whose result is cast back to the argument type, keyed by full name.
static CAST_TO_INT64: Lazy<HashSet<&'static str>> = Lazy::new(|| ["SqlServer.CHARINDEX"].into_iter().collect());

static CAST_TO_INT32: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["SqlServer.LEN", "SqlServer.PATINDEX", "SqlServer.DATALENGTH", "SqlServer.CHARINDEX", "Edm.IndexOf", "Edm.Length"]
        .into_iter()
        .collect()
});

static CAST_TO_INT16: Lazy<HashSet<&'static str>> = Lazy::new(|| ["Edm.Abs"].into_iter().collect());

static CAST_TO_SINGLE: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["Edm.Abs", "Edm.Round", "Edm.Floor", "Edm.Ceiling"].into_iter().collect());

/// Escapes the LIKE wildcards of `text` with [`LIKE_ESCAPE_CHAR`]. The flag
/// tells whether anything needed escaping; if not, the text is returned as is.
pub(crate) fn escape_like_text(text: &str) -> (String, bool) {
    if !text.contains(['%', '_', '[', '^']) {
        return (text.to_string(), false);
    }
    let mut escaped = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if matches!(c, '%' | '_' | '[' | '^' | LIKE_ESCAPE_CHAR) {
            escaped.push(LIKE_ESCAPE_CHAR);
        }
        escaped.push(c);
    }
    (escaped, true)
}

fn non_empty_string_constant(e: &DbExpression) -> Option<(&str, &TypeUsage)> {
    match e {
        DbExpression::Constant { value: ConstantValue::String(s), result_type } if !s.is_empty() => {
            Some((s.as_str(), result_type))
        }
        _ => None,
    }
}

impl SqlGenerator {
    pub(super) fn visit_function(
        &mut self,
        function: &EdmFunction,
        arguments: &[DbExpression],
        result_type: &TypeUsage,
    ) -> Result<SqlFragment> {
        let call = FunctionCall { function, arguments, result_type };

        if function.is_canonical() {
            if let Some(handler) = CANONICAL_HANDLERS.get(function.name.as_str()) {
                return handler(self, &call);
            }
        }
        if function.is_store() {
            if let Some(handler) = STORE_HANDLERS.get(function.name.as_str()) {
                return handler(self, &call);
            }
        }
        if function.is_canonical() {
            if let Some(kind) = spatial_kind(&call) {
                self.require_katmai("spatial functions")?;
                return self.visit_spatial_function(&call, kind);
            }
        }
        self.handle_function_default_given_name(&call, None)
    }

    /// `name(args)`, wrapped in a cast when the server's result type is
    /// narrower or wider than the model's.
    pub(super) fn handle_function_default_given_name(
        &mut self,
        call: &FunctionCall<'_>,
        name: Option<&str>,
    ) -> Result<SqlFragment> {
        let cast_to = self.return_type_cast(call);
        let mut body = SqlBuilder::new();
        match name {
            Some(name) => {
                body.append(name.to_string());
            }
            None => write_function_name(call.function, &mut body),
        }
        self.write_function_arguments_checked(call, &mut body)?;
        Ok(wrap_with_cast(cast_to, body))
    }

    fn return_type_cast(&self, call: &FunctionCall<'_>) -> Option<&'static str> {
        let full_name = call.function.full_name();
        let full_name = full_name.as_str();
        // CHARINDEX is in two lists, so the order matters.
        if CAST_TO_INT64.contains(full_name) && call.any_argument_of_kind(PrimitiveTypeKind::Int64) {
            Some("bigint")
        } else if CAST_TO_INT32.contains(full_name) && self.any_argument_of_max_type(call) {
            Some("int")
        } else if CAST_TO_INT16.contains(full_name) && call.any_argument_of_kind(PrimitiveTypeKind::Int16) {
            Some("smallint")
        } else if CAST_TO_SINGLE.contains(full_name) && call.any_argument_of_kind(PrimitiveTypeKind::Single) {
            Some("real")
        } else {
            None
        }
    }

    fn any_argument_of_max_type(&self, call: &FunctionCall<'_>) -> bool {
        call.arguments
            .iter()
            .any(|a| matches!(StoreType::for_type(self.version, &a.result_type()), Ok(store) if store.is_max_type()))
    }

    fn write_function_arguments_checked(&mut self, call: &FunctionCall<'_>, result: &mut SqlBuilder) -> Result<()> {
        if call.function.niladic {
            if !call.arguments.is_empty() {
                return Err(Error::metadata(format!(
                    "niladic function {} cannot take arguments",
                    call.function.full_name()
                )));
            }
            return Ok(());
        }
        self.write_function_arguments(call.arguments, result)
    }

    /// `(a, b, ...)`
    pub(super) fn write_function_arguments<'e>(
        &mut self,
        arguments: impl IntoIterator<Item = &'e DbExpression>,
        result: &mut SqlBuilder,
    ) -> Result<()> {
        result.append("(");
        for (i, argument) in arguments.into_iter().enumerate() {
            if i > 0 {
                result.append(", ");
            }
            result.append(self.visit(argument)?);
        }
        result.append(")");
        Ok(())
    }

    fn handle_given_name_by_version(&mut self, call: &FunctionCall<'_>, pre_katmai: &str, katmai: &str) -> Result<SqlFragment> {
        let name = if self.version.is_pre_katmai() { pre_katmai } else { katmai };
        self.handle_function_default_given_name(call, Some(name))
    }

    fn handle_round_or_truncate(&mut self, call: &FunctionCall<'_>, round: bool) -> Result<SqlFragment> {
        let cast_to_single = call.arguments.len() == 1
            && CAST_TO_SINGLE.contains(call.function.full_name().as_str())
            && call.any_argument_of_kind(PrimitiveTypeKind::Single);

        let mut body = SqlBuilder::text("ROUND(");
        body.append(self.visit(call.argument(0)?)?);
        body.append(", ");
        match call.arguments.get(1) {
            Some(digits) => {
                body.append(self.visit(digits)?);
            }
            None => {
                body.append("0");
            }
        }
        if !round {
            body.append(", 1");
        }
        body.append(")");
        Ok(wrap_with_cast(cast_to_single.then_some("real"), body))
    }

    fn handle_abs(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let argument = call.argument(0)?;
        // tinyint is unsigned already.
        if argument.result_type().is_primitive_kind(PrimitiveTypeKind::Byte) {
            return Ok(SqlBuilder::text(self.visit(argument)?).into());
        }
        self.handle_function_default_given_name(call, None)
    }

    fn handle_trim(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let mut result = SqlBuilder::text("LTRIM(RTRIM(");
        result.append(self.visit(call.argument(0)?)?);
        result.append("))");
        Ok(result.into())
    }

    fn handle_datepart(&mut self, call: &FunctionCall<'_>, datepart: &str) -> Result<SqlFragment> {
        let mut result = SqlBuilder::text("DATEPART (");
        result.append(datepart.to_string());
        result.append(", ");
        result.append(self.visit(call.argument(0)?)?);
        result.append(")");
        Ok(result.into())
    }

    fn handle_date_add(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let datepart = DATE_ADD_PARTS.get(call.function.name.as_str()).copied().unwrap_or("day");
        if matches!(datepart, "microsecond" | "nanosecond") {
            self.require_katmai(&call.function.name)?;
        }
        let mut result = SqlBuilder::text("DATEADD (");
        result.append(datepart);
        result.append(", ");
        result.append(self.visit(call.argument(1)?)?);
        result.append(", ");
        result.append(self.visit(call.argument(0)?)?);
        result.append(")");
        Ok(result.into())
    }

    fn handle_date_diff(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let datepart = DATE_DIFF_PARTS.get(call.function.name.as_str()).copied().unwrap_or("day");
        if matches!(datepart, "microsecond" | "nanosecond") {
            self.require_katmai(&call.function.name)?;
        }
        let mut result = SqlBuilder::text("DATEDIFF (");
        result.append(datepart);
        result.append(", ");
        result.append(self.visit(call.argument(0)?)?);
        result.append(", ");
        result.append(self.visit(call.argument(1)?)?);
        result.append(")");
        Ok(result.into())
    }

    /// Builds the value from its parts as a string in ODBC canonical format
    /// and converts it with style 121. On 2008 the year goes through DATEADD,
    /// since years before 1000 do not print as four digits.
    fn handle_date_time_creation(
        &mut self,
        call: &FunctionCall<'_>,
        type_name: &str,
        has_date_part: bool,
        has_time_zone_part: bool,
    ) -> Result<SqlFragment> {
        let expected = if has_date_part { 6 } else { 3 } + usize::from(has_time_zone_part);
        if call.arguments.len() != expected {
            return Err(Error::invalid_operation(format!(
                "{} expects {expected} arguments, got {}",
                call.function.full_name(),
                call.arguments.len()
            )));
        }
        let katmai = !self.version.is_pre_katmai();
        let mut args = call.arguments.iter();
        let mut next = || args.next().ok_or_else(|| Error::invalid_operation("missing date part"));

        let mut result = SqlBuilder::new();
        if katmai && has_date_part {
            result.append("DATEADD(year, ");
            self.parenthesize_if_needed(next()?, &mut result)?;
            result.append(" - 1, ");
        }
        result.append("convert (");
        result.append(type_name.to_string());
        result.append(",");

        if has_date_part {
            if katmai {
                result.append("'0001'");
            } else {
                self.append_convert_to_varchar(next()?, &mut result)?;
            }
            result.append(" + '-' + ");
            self.append_convert_to_varchar(next()?, &mut result)?;
            result.append(" + '-' + ");
            self.append_convert_to_varchar(next()?, &mut result)?;
            result.append(" + ' ' + ");
        }

        self.append_convert_to_varchar(next()?, &mut result)?;
        result.append(" + ':' + ");
        self.append_convert_to_varchar(next()?, &mut result)?;
        result.append(" + ':' + str(");
        result.append(self.visit(next()?)?);
        result.append(if katmai { ", 10, 7)" } else { ", 6, 3)" });

        if has_time_zone_part {
            let offset = next()?;
            result.append(" + (CASE WHEN ");
            self.parenthesize_if_needed(offset, &mut result)?;
            result.append(" >= 0 THEN '+' ELSE '-' END) + convert(varchar(255), ABS(");
            self.parenthesize_if_needed(offset, &mut result)?;
            result.append("/60)) + ':' + convert(varchar(255), ABS(");
            self.parenthesize_if_needed(offset, &mut result)?;
            result.append("%60))");
        }

        result.append(", 121)");
        if katmai && has_date_part {
            result.append(")");
        }
        Ok(result.into())
    }

    fn append_convert_to_varchar(&mut self, e: &DbExpression, result: &mut SqlBuilder) -> Result<()> {
        result.append("convert(varchar(255), ");
        result.append(self.visit(e)?);
        result.append(")");
        Ok(())
    }

    fn handle_truncate_time(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let argument = call.argument(0)?;
        let (type_name, is_offset) = match argument.result_type().primitive_kind() {
            Some(PrimitiveTypeKind::DateTime) => {
                (if self.version.is_pre_katmai() { "datetime" } else { "datetime2" }, false)
            }
            Some(PrimitiveTypeKind::DateTimeOffset) => ("datetimeoffset", true),
            _ => {
                return Err(Error::invalid_operation(format!(
                    "TruncateTime does not apply to {}",
                    argument.result_type()
                )));
            }
        };

        let mut result = SqlBuilder::text("convert (");
        result.append(type_name);
        result.append(", convert(varchar(255), ");
        result.append(self.visit(argument)?);
        result.append(", 102) ");
        if is_offset {
            result.append("+ ' 00:00:00 ' +  Right(convert(varchar(255), ");
            result.append(self.visit(argument)?);
            result.append(", 121), 6)  ");
        }
        result.append(",  102)");
        Ok(result.into())
    }

    /// `a op b`, or `op a` for unary operators.
    fn handle_function_to_operator(&mut self, call: &FunctionCall<'_>, parenthesize: bool) -> Result<SqlFragment> {
        let op = OPERATORS
            .get(call.function.name.as_str())
            .copied()
            .ok_or_else(|| Error::invalid_operation(format!("{} is not an operator", call.function.full_name())))?;
        let last = call.arguments.last().ok_or_else(|| {
            Error::invalid_operation(format!("{} needs at least one argument", call.function.full_name()))
        })?;

        let mut result = SqlBuilder::new();
        let operand = |g: &mut Self, e: &DbExpression, result: &mut SqlBuilder| -> Result<()> {
            if parenthesize {
                result.append("(");
            }
            result.append(g.visit(e)?);
            if parenthesize {
                result.append(")");
            }
            Ok(())
        };
        if call.arguments.len() > 1 {
            operand(self, &call.arguments[0], &mut result)?;
        }
        result.append(" ");
        result.append(op);
        result.append(" ");
        operand(self, last, &mut result)?;
        Ok(result.into())
    }

    fn handle_datepart_store_function(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let datepart = match call.arguments.first() {
            Some(DbExpression::Constant { value: ConstantValue::String(s), .. }) => s,
            _ => {
                return Err(Error::invalid_operation(format!(
                    "the first argument of {} must be a datepart string constant",
                    call.function.full_name()
                )));
            }
        };
        if !DATEPART_KEYWORDS.contains(datepart.to_lowercase().as_str()) {
            return Err(Error::invalid_operation(format!(
                "'{datepart}' is not a valid datepart for {}",
                call.function.full_name()
            )));
        }

        let mut result = SqlBuilder::new();
        write_function_name(call.function, &mut result);
        result.append("(");
        result.append(datepart.clone());
        for argument in &call.arguments[1..] {
            result.append(", ");
            result.append(self.visit(argument)?);
        }
        result.append(")");
        Ok(result.into())
    }

    /// `Contains`, `StartsWith` and `EndsWith` outside a boolean context
    /// become a bit through CASE.
    fn handle_string_predicate(&mut self, call: &FunctionCall<'_>) -> Result<SqlFragment> {
        let name = call.function.name.as_str();
        let (Some(first), Some(second)) = (
            self.translate_string_predicate(name, call.arguments)?,
            self.translate_string_predicate(name, call.arguments)?,
        ) else {
            return self.handle_function_default_given_name(call, None);
        };
        let mut result = SqlBuilder::text("CASE WHEN (");
        result.append(first);
        result.append(") THEN cast(1 as bit) WHEN ( NOT (");
        result.append(second);
        result.append(")) THEN cast(0 as bit) END");
        Ok(result.into())
    }

    /// The bare predicate of a canonical string matching function, or `None`
    /// when `name` is not one.
    pub(super) fn translate_string_predicate(
        &mut self,
        name: &str,
        arguments: &[DbExpression],
    ) -> Result<Option<SqlBuilder>> {
        let (starts_with_any, ends_with_any, fallback_end) = match name {
            "Contains" => (true, true, ") > 0"),
            "StartsWith" => (false, true, ") = 1"),
            "EndsWith" => (true, false, ")) = 1"),
            _ => return Ok(None),
        };
        let [target, search] = arguments else {
            return Err(Error::invalid_operation(format!("Edm.{name} takes two arguments")));
        };

        let mut result = SqlBuilder::new();
        // Trailing blanks are ignored by LIKE, so EndsWith keeps CHARINDEX
        // unless the target is a column.
        let like_allowed = name != "EndsWith" || matches!(target, DbExpression::Property { .. });
        match non_empty_string_constant(search) {
            Some((text, ty)) if like_allowed => {
                let force = match_source_pattern(target) && match_target_pattern(search);
                self.forcing_non_unicode(force, |g| {
                    g.translate_constant_for_like(target, text, ty, starts_with_any, ends_with_any, &mut result)
                })?;
            }
            _ => {
                if name == "EndsWith" {
                    result.append("CHARINDEX( REVERSE(");
                    result.append(self.visit(search)?);
                    result.append("), REVERSE(");
                } else {
                    result.append("CHARINDEX( ");
                    result.append(self.visit(search)?);
                    result.append(", ");
                }
                result.append(self.visit(target)?);
                result.append(fallback_end);
            }
        }
        Ok(Some(result))
    }

    fn translate_constant_for_like(
        &mut self,
        target: &DbExpression,
        text: &str,
        ty: &TypeUsage,
        percent_start: bool,
        percent_end: bool,
        result: &mut SqlBuilder,
    ) -> Result<()> {
        result.append(self.visit(target)?);
        result.append(" LIKE ");

        let (escaped, escaping_occurred) = escape_like_text(text);
        let mut pattern = String::with_capacity(escaped.len() + 2);
        if percent_start {
            pattern.push('%');
        }
        pattern.push_str(&escaped);
        if percent_end {
            pattern.push('%');
        }
        result.append(self.visit_constant(&ConstantValue::String(pattern), ty, false)?);

        if escaping_occurred {
            result.append(format!(" ESCAPE '{LIKE_ESCAPE_CHAR}'"));
        }
        Ok(())
    }
}

/// Canonical functions go by their upper-cased store name, store built-ins
/// verbatim, anything else by its quoted schema and name.
pub(super) fn write_function_name(function: &EdmFunction, result: &mut SqlBuilder) {
    let store_name = function.store_name();
    if function.is_canonical() {
        result.append(store_name.to_uppercase());
    } else if function.is_store() {
        result.append(store_name.to_string());
    } else {
        let schema = function.schema.as_deref().filter(|s| !s.is_empty()).unwrap_or(&function.namespace);
        result.append(quote_identifier(schema));
        result.append(".");
        result.append(quote_identifier(store_name));
    }
}

/// ` CAST(body AS type)` when `cast_to` is set.
pub(super) fn wrap_with_cast(cast_to: Option<&str>, body: SqlBuilder) -> SqlFragment {
    match cast_to {
        Some(type_name) => {
            let mut result = SqlBuilder::text(" CAST(");
            result.append(body);
            result.append(" AS ");
            result.append(type_name.to_string());
            result.append(")");
            result.into()
        }
        None => body.into(),
    }
}

/// Spatial type a canonical call works on: the result type's, else the first
/// spatial argument's.
fn spatial_kind(call: &FunctionCall<'_>) -> Option<PrimitiveTypeKind> {
    if call.result_type.is_spatial() {
        return call.result_type.primitive_kind();
    }
    call.arguments.iter().map(DbExpression::result_type).find(TypeUsage::is_spatial).and_then(|t| t.primitive_kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqlVersion, sqlgen::Renderer};

    fn sql(version: SqlVersion, e: &DbExpression) -> Result<String> {
        let mut generator = SqlGenerator::new(version);
        let fragment = generator.visit(e)?;
        Renderer::new(version, &generator.statements, &generator.symbols, &generator.usage, &generator.names)
            .render(&fragment, "\n")
    }

    fn canonical(name: &str, arguments: Vec<DbExpression>, result_type: TypeUsage) -> DbExpression {
        DbExpression::invoke(EdmFunction::canonical(name), arguments, result_type)
    }

    fn text_param(name: &str) -> DbExpression {
        DbExpression::parameter(name, TypeUsage::string(None))
    }

    #[test]
    fn renamed_canonical_functions() {
        let e = canonical("ToUpper", vec![text_param("s")], TypeUsage::string(None));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "UPPER(@s)");
        let e = canonical("NewGuid", vec![], TypeUsage::primitive(PrimitiveTypeKind::Guid));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "NEWID()");
        let e = canonical("Left", vec![text_param("s"), DbExpression::constant(2)], TypeUsage::string(None));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "LEFT(@s, 2)");
    }

    #[test]
    fn length_of_max_strings_is_cast_to_int() {
        let e = canonical("Length", vec![text_param("s")], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), " CAST(LEN(@s) AS int)");

        let narrow = DbExpression::parameter("s", TypeUsage::string(None).with_max_length(10));
        let e = canonical("Length", vec![narrow], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "LEN(@s)");
    }

    #[test]
    fn charindex_over_bigint_is_cast_to_bigint_first() {
        let e = DbExpression::invoke(
            EdmFunction::store("CHARINDEX"),
            vec![text_param("a"), text_param("b"), DbExpression::constant(1i64)],
            TypeUsage::int64(),
        );
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), " CAST(CHARINDEX(@a, @b, cast(1 as bigint)) AS bigint)");
    }

    #[test]
    fn round_truncate_and_abs() {
        let single = DbExpression::parameter("f", TypeUsage::primitive(PrimitiveTypeKind::Single));
        let e = canonical("Round", vec![single.clone()], TypeUsage::primitive(PrimitiveTypeKind::Single));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), " CAST(ROUND(@f, 0) AS real)");

        let e = canonical("Truncate", vec![single, DbExpression::constant(2)], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "ROUND(@f, 2, 1)");

        let byte = DbExpression::parameter("b", TypeUsage::primitive(PrimitiveTypeKind::Byte));
        let e = canonical("Abs", vec![byte], TypeUsage::primitive(PrimitiveTypeKind::Byte));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "@b");

        let short = DbExpression::parameter("h", TypeUsage::primitive(PrimitiveTypeKind::Int16));
        let e = canonical("Abs", vec![short], TypeUsage::primitive(PrimitiveTypeKind::Int16));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), " CAST(ABS(@h) AS smallint)");
    }

    #[test]
    fn dates() {
        let dt = DbExpression::parameter("d", TypeUsage::primitive(PrimitiveTypeKind::DateTime));
        let e = canonical("Year", vec![dt.clone()], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "DATEPART (year, @d)");

        let e = canonical("AddDays", vec![dt.clone(), DbExpression::constant(3)], dt.result_type());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "DATEADD (day, 3, @d)");

        let e = canonical("DiffNanoseconds", vec![dt.clone(), dt.clone()], TypeUsage::int32());
        match sql(SqlVersion::Sql9, &e) {
            Err(Error::NotSupported(_)) => {}
            other => panic!("expected NotSupported, got {other:?}"),
        }
        assert_eq!(sql(SqlVersion::Sql10, &e).unwrap(), "DATEDIFF (nanosecond, @d, @d)");

        let e = canonical("CurrentDateTime", vec![], dt.result_type());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "GetDate()");
        assert_eq!(sql(SqlVersion::Sql10, &e).unwrap(), "SysDateTime()");

        let e = canonical("TruncateTime", vec![dt.clone()], dt.result_type());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "convert (datetime, convert(varchar(255), @d, 102) ,  102)");
    }

    #[test]
    fn create_date_time_differs_by_version() {
        let args: Vec<DbExpression> = (1..=6).map(|i| DbExpression::parameter(&format!("p{i}"), TypeUsage::int32())).collect();
        let dt = TypeUsage::primitive(PrimitiveTypeKind::DateTime);
        let e = canonical("CreateDateTime", args, dt);
        assert_eq!(
            sql(SqlVersion::Sql9, &e).unwrap(),
            "convert (datetime,convert(varchar(255), @p1) + '-' + convert(varchar(255), @p2) + '-' + \
             convert(varchar(255), @p3) + ' ' + convert(varchar(255), @p4) + ':' + convert(varchar(255), @p5) \
             + ':' + str(@p6, 6, 3), 121)"
        );
        assert_eq!(
            sql(SqlVersion::Sql10, &e).unwrap(),
            "DATEADD(year, @p1 - 1, convert (datetime2,'0001' + '-' + convert(varchar(255), @p2) + '-' + \
             convert(varchar(255), @p3) + ' ' + convert(varchar(255), @p4) + ':' + convert(varchar(255), @p5) \
             + ':' + str(@p6, 10, 7), 121))"
        );
    }

    #[test]
    fn operators() {
        let e = canonical("Concat", vec![text_param("a"), text_param("b")], TypeUsage::string(None));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "@a + @b");

        let i = DbExpression::parameter("i", TypeUsage::int32());
        let e = canonical("BitwiseNot", vec![i.clone()], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), " ~ (@i)");
        let e = canonical("BitwiseAnd", vec![i.clone(), DbExpression::constant(4)], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "(@i) & (4)");
    }

    #[test]
    fn store_datepart_functions_check_the_keyword() {
        let dt = DbExpression::parameter("d", TypeUsage::primitive(PrimitiveTypeKind::DateTime));
        let e = DbExpression::invoke(
            EdmFunction::store("DATEADD"),
            vec![DbExpression::constant("QQ"), DbExpression::constant(1), dt.clone()],
            dt.result_type(),
        );
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "DATEADD(QQ, 1, @d)");

        let bad = DbExpression::invoke(
            EdmFunction::store("DATEPART"),
            vec![DbExpression::constant("fortnight"), dt.clone()],
            TypeUsage::int32(),
        );
        match sql(SqlVersion::Sql9, &bad) {
            Err(Error::InvalidOperation(msg)) => assert!(msg.contains("fortnight")),
            other => panic!("expected InvalidOperation, got {other:?}"),
        }
    }

    #[test]
    fn user_functions_are_quoted_and_niladic_ones_take_no_arguments() {
        let f = EdmFunction::user("Shop", "Score").with_schema("dbo");
        let e = DbExpression::invoke(f, vec![DbExpression::constant(1)], TypeUsage::int32());
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "[dbo].[Score](1)");

        let now = EdmFunction::store("CURRENT_TIMESTAMP").niladic();
        let e = DbExpression::invoke(now.clone(), vec![], TypeUsage::primitive(PrimitiveTypeKind::DateTime));
        assert_eq!(sql(SqlVersion::Sql9, &e).unwrap(), "CURRENT_TIMESTAMP");

        let e = DbExpression::invoke(now, vec![DbExpression::constant(1)], TypeUsage::int32());
        match sql(SqlVersion::Sql9, &e) {
            Err(Error::Metadata(_)) => {}
            other => panic!("expected Metadata error, got {other:?}"),
        }
    }

    #[test]
    fn like_text_escaping() {
        assert_eq!(escape_like_text("abc~"), ("abc~".to_string(), false));
        assert_eq!(escape_like_text("50%~"), ("50~%~~".to_string(), true));
        assert_eq!(escape_like_text("[a_b]"), ("~[a~_b]".to_string(), true));
    }

    #[test]
    fn contains_with_a_constant_becomes_like() {
        let e = canonical("Contains", vec![text_param("s"), DbExpression::constant("50%")], TypeUsage::boolean());
        assert_eq!(
            sql(SqlVersion::Sql9, &e).unwrap(),
            "CASE WHEN (@s LIKE N'%50~%%' ESCAPE '~') THEN cast(1 as bit) \
             WHEN ( NOT (@s LIKE N'%50~%%' ESCAPE '~')) THEN cast(0 as bit) END"
        );

        let mut generator = SqlGenerator::new(SqlVersion::Sql9);
        let bare = generator
            .translate_string_predicate("StartsWith", &[text_param("s"), DbExpression::constant("ab")])
            .unwrap()
            .unwrap();
        let text = Renderer::new(SqlVersion::Sql9, &generator.statements, &generator.symbols, &generator.usage, &generator.names)
            .render(&bare.into(), "\n")
            .unwrap();
        assert_eq!(text, "@s LIKE N'ab%'");
    }

    #[test]
    fn string_predicates_fall_back_to_charindex() {
        let mut generator = SqlGenerator::new(SqlVersion::Sql9);
        let contains = generator.translate_string_predicate("Contains", &[text_param("s"), text_param("t")]).unwrap();
        let ends = generator
            .translate_string_predicate("EndsWith", &[text_param("s"), DbExpression::constant("x")])
            .unwrap();
        assert!(generator.translate_string_predicate("IndexOf", &[text_param("s"), text_param("t")]).unwrap().is_none());

        let render = |b: SqlBuilder| {
            Renderer::new(SqlVersion::Sql9, &generator.statements, &generator.symbols, &generator.usage, &generator.names)
                .render(&b.into(), "\n")
                .unwrap()
        };
        assert_eq!(render(contains.unwrap()), "CHARINDEX( @t, @s) > 0");
        assert_eq!(render(ends.unwrap()), "CHARINDEX( REVERSE(N'x'), REVERSE(@s)) = 1");
    }
}
