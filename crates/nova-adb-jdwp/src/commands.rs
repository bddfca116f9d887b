//! Names for JDWP command sets, commands and error codes.
//!
//! These tables are only used to render diagnostics (see the `Display` impl of
//! [`JdwpPacket`](crate::JdwpPacket)). Unknown values format as their decimal
//! number.

pub const VIRTUAL_MACHINE: u8 = 1;
pub const REFERENCE_TYPE: u8 = 2;
pub const CLASS_TYPE: u8 = 3;
pub const ARRAY_TYPE: u8 = 4;
pub const INTERFACE_TYPE: u8 = 5;
pub const METHOD: u8 = 6;
pub const FIELD: u8 = 8;
pub const OBJECT_REFERENCE: u8 = 9;
pub const STRING_REFERENCE: u8 = 10;
pub const THREAD_REFERENCE: u8 = 11;
pub const THREAD_GROUP_REFERENCE: u8 = 12;
pub const ARRAY_REFERENCE: u8 = 13;
pub const CLASS_LOADER_REFERENCE: u8 = 14;
pub const EVENT_REQUEST: u8 = 15;
pub const STACK_FRAME: u8 = 16;
pub const CLASS_OBJECT_REFERENCE: u8 = 17;
pub const MODULE_REFERENCE: u8 = 18;
pub const EVENT: u8 = 64;
/// Android DDM chunks ride on JDWP command set `0xC7`.
pub const DDM: u8 = 0xC7;

type CommandSet = (u8, &'static str, &'static [(u8, &'static str)]);

static COMMAND_SETS: &[CommandSet] = &[
    (
        VIRTUAL_MACHINE,
        "VirtualMachine",
        &[
            (1, "Version"),
            (2, "ClassesBySignature"),
            (3, "AllClasses"),
            (4, "AllThreads"),
            (5, "TopLevelThreadGroups"),
            (6, "Dispose"),
            (7, "IDSizes"),
            (8, "Suspend"),
            (9, "Resume"),
            (10, "Exit"),
            (11, "CreateString"),
            (12, "Capabilities"),
            (13, "ClassPaths"),
            (14, "DisposeObjects"),
            (15, "HoldEvents"),
            (16, "ReleaseEvents"),
            (17, "CapabilitiesNew"),
            (18, "RedefineClasses"),
            (19, "SetDefaultStratum"),
            (20, "AllClassesWithGeneric"),
            (21, "InstanceCounts"),
            (22, "AllModules"),
        ],
    ),
    (
        REFERENCE_TYPE,
        "ReferenceType",
        &[
            (1, "Signature"),
            (2, "ClassLoader"),
            (3, "Modifiers"),
            (4, "Fields"),
            (5, "Methods"),
            (6, "GetValues"),
            (7, "SourceFile"),
            (8, "NestedTypes"),
            (9, "Status"),
            (10, "Interfaces"),
            (11, "ClassObject"),
            (12, "SourceDebugExtension"),
            (13, "SignatureWithGeneric"),
            (14, "FieldsWithGeneric"),
            (15, "MethodsWithGeneric"),
            (16, "Instances"),
            (17, "ClassFileVersion"),
            (18, "ConstantPool"),
            (19, "Module"),
        ],
    ),
    (
        CLASS_TYPE,
        "ClassType",
        &[
            (1, "Superclass"),
            (2, "SetValues"),
            (3, "InvokeMethod"),
            (4, "NewInstance"),
        ],
    ),
    (ARRAY_TYPE, "ArrayType", &[(1, "NewInstance")]),
    (INTERFACE_TYPE, "InterfaceType", &[(1, "InvokeMethod")]),
    (
        METHOD,
        "Method",
        &[
            (1, "LineTable"),
            (2, "VariableTable"),
            (3, "Bytecodes"),
            (4, "IsObsolete"),
            (5, "VariableTableWithGeneric"),
        ],
    ),
    (FIELD, "Field", &[]),
    (
        OBJECT_REFERENCE,
        "ObjectReference",
        &[
            (1, "ReferenceType"),
            (2, "GetValues"),
            (3, "SetValues"),
            (5, "MonitorInfo"),
            (6, "InvokeMethod"),
            (7, "DisableCollection"),
            (8, "EnableCollection"),
            (9, "IsCollected"),
            (10, "ReferringObjects"),
        ],
    ),
    (STRING_REFERENCE, "StringReference", &[(1, "Value")]),
    (
        THREAD_REFERENCE,
        "ThreadReference",
        &[
            (1, "Name"),
            (2, "Suspend"),
            (3, "Resume"),
            (4, "Status"),
            (5, "ThreadGroup"),
            (6, "Frames"),
            (7, "FrameCount"),
            (8, "OwnedMonitors"),
            (9, "CurrentContendedMonitor"),
            (10, "Stop"),
            (11, "Interrupt"),
            (12, "SuspendCount"),
            (13, "OwnedMonitorsStackDepthInfo"),
            (14, "ForceEarlyReturn"),
        ],
    ),
    (
        THREAD_GROUP_REFERENCE,
        "ThreadGroupReference",
        &[(1, "Name"), (2, "Parent"), (3, "Children")],
    ),
    (
        ARRAY_REFERENCE,
        "ArrayReference",
        &[(1, "Length"), (2, "GetValues"), (3, "SetValues")],
    ),
    (
        CLASS_LOADER_REFERENCE,
        "ClassLoaderReference",
        &[(1, "VisibleClasses")],
    ),
    (
        EVENT_REQUEST,
        "EventRequest",
        &[(1, "Set"), (2, "Clear"), (3, "ClearAllBreakpoints")],
    ),
    (
        STACK_FRAME,
        "StackFrame",
        &[
            (1, "GetValues"),
            (2, "SetValues"),
            (3, "ThisObject"),
            (4, "PopFrames"),
        ],
    ),
    (
        CLASS_OBJECT_REFERENCE,
        "ClassObjectReference",
        &[(1, "ReflectedType")],
    ),
    (
        MODULE_REFERENCE,
        "ModuleReference",
        &[(1, "Name"), (2, "ClassLoader")],
    ),
    (EVENT, "Event", &[(100, "Composite")]),
    (DDM, "DDM", &[(1, "Chunk")]),
];

static ERROR_CODES: &[(u16, &str)] = &[
    (0, "NONE"),
    (10, "INVALID_THREAD"),
    (11, "INVALID_THREAD_GROUP"),
    (12, "INVALID_PRIORITY"),
    (13, "THREAD_NOT_SUSPENDED"),
    (14, "THREAD_SUSPENDED"),
    (15, "THREAD_NOT_ALIVE"),
    (20, "INVALID_OBJECT"),
    (21, "INVALID_CLASS"),
    (22, "CLASS_NOT_PREPARED"),
    (23, "INVALID_METHODID"),
    (24, "INVALID_LOCATION"),
    (25, "INVALID_FIELDID"),
    (30, "INVALID_FRAMEID"),
    (31, "NO_MORE_FRAMES"),
    (32, "OPAQUE_FRAME"),
    (33, "NOT_CURRENT_FRAME"),
    (34, "TYPE_MISMATCH"),
    (35, "INVALID_SLOT"),
    (40, "DUPLICATE"),
    (41, "NOT_FOUND"),
    (42, "INVALID_MODULE"),
    (50, "INVALID_MONITOR"),
    (51, "NOT_MONITOR_OWNER"),
    (52, "INTERRUPT"),
    (60, "INVALID_CLASS_FORMAT"),
    (61, "CIRCULAR_CLASS_DEFINITION"),
    (62, "FAILS_VERIFICATION"),
    (63, "ADD_METHOD_NOT_IMPLEMENTED"),
    (64, "SCHEMA_CHANGE_NOT_IMPLEMENTED"),
    (65, "INVALID_TYPESTATE"),
    (66, "HIERARCHY_CHANGE_NOT_IMPLEMENTED"),
    (67, "DELETE_METHOD_NOT_IMPLEMENTED"),
    (68, "UNSUPPORTED_VERSION"),
    (69, "NAMES_DONT_MATCH"),
    (70, "CLASS_MODIFIERS_CHANGE_NOT_IMPLEMENTED"),
    (71, "METHOD_MODIFIERS_CHANGE_NOT_IMPLEMENTED"),
    (72, "CLASS_ATTRIBUTE_CHANGE_NOT_IMPLEMENTED"),
    (99, "NOT_IMPLEMENTED"),
    (100, "NULL_POINTER"),
    (101, "ABSENT_INFORMATION"),
    (102, "INVALID_EVENT_TYPE"),
    (103, "ILLEGAL_ARGUMENT"),
    (110, "OUT_OF_MEMORY"),
    (111, "ACCESS_DENIED"),
    (112, "VM_DEAD"),
    (113, "INTERNAL"),
    (115, "UNATTACHED_THREAD"),
    (500, "INVALID_TAG"),
    (502, "ALREADY_INVOKING"),
    (503, "INVALID_INDEX"),
    (504, "INVALID_LENGTH"),
    (506, "INVALID_STRING"),
    (507, "INVALID_CLASS_LOADER"),
    (508, "INVALID_ARRAY"),
    (509, "TRANSPORT_LOAD"),
    (510, "TRANSPORT_INIT"),
    (511, "NATIVE_METHOD"),
    (512, "INVALID_COUNT"),
];

fn find_set(cmd_set: u8) -> Option<&'static CommandSet> {
    COMMAND_SETS.iter().find(|(id, _, _)| *id == cmd_set)
}

pub fn cmd_set_name(cmd_set: u8) -> Option<&'static str> {
    find_set(cmd_set).map(|(_, name, _)| *name)
}

pub fn cmd_name(cmd_set: u8, cmd: u8) -> Option<&'static str> {
    let (_, _, commands) = find_set(cmd_set)?;
    commands
        .iter()
        .find(|(id, _)| *id == cmd)
        .map(|(_, name)| *name)
}

pub fn error_code_name(error_code: u16) -> Option<&'static str> {
    ERROR_CODES
        .iter()
        .find(|(id, _)| *id == error_code)
        .map(|(_, name)| *name)
}

pub fn cmd_set_to_string(cmd_set: u8) -> String {
    cmd_set_name(cmd_set)
        .map(str::to_string)
        .unwrap_or_else(|| cmd_set.to_string())
}

pub fn cmd_to_string(cmd_set: u8, cmd: u8) -> String {
    cmd_name(cmd_set, cmd)
        .map(str::to_string)
        .unwrap_or_else(|| cmd.to_string())
}

pub fn error_code_to_string(error_code: u16) -> String {
    error_code_name(error_code)
        .map(str::to_string)
        .unwrap_or_else(|| error_code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_names() {
        assert_eq!(cmd_set_to_string(VIRTUAL_MACHINE), "VirtualMachine");
        assert_eq!(cmd_to_string(VIRTUAL_MACHINE, 7), "IDSizes");
        assert_eq!(cmd_to_string(THREAD_REFERENCE, 6), "Frames");
        assert_eq!(cmd_to_string(EVENT, 100), "Composite");
        assert_eq!(cmd_to_string(DDM, 1), "Chunk");
        assert_eq!(error_code_to_string(20), "INVALID_OBJECT");
    }

    #[test]
    fn unknown_codes_fall_back_to_numbers() {
        assert_eq!(cmd_set_to_string(7), "7");
        assert_eq!(cmd_to_string(EVENT_REQUEST, 10), "10");
        assert_eq!(cmd_to_string(200, 1), "1");
        assert_eq!(error_code_to_string(9999), "9999");
    }

    #[test]
    fn tables_have_no_duplicate_keys() {
        let mut sets: Vec<u8> = COMMAND_SETS.iter().map(|(id, _, _)| *id).collect();
        sets.sort_unstable();
        sets.dedup();
        assert_eq!(sets.len(), COMMAND_SETS.len());

        for (_, name, commands) in COMMAND_SETS {
            let mut ids: Vec<u8> = commands.iter().map(|(id, _)| *id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), commands.len(), "duplicate command in {name}");
        }
    }
}
