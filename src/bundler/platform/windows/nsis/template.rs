//! NSI script template.
//!
//! Rendered by handlebars without escaping. Values that sit next to a
//! backslash in the script (`$INSTDIR\...`, registry keys) are passed in
//! precomputed because `\{{` is handlebars' escape for a literal mustache.

pub const NSI_TEMPLATE: &str = r#"Unicode true
ManifestDPIAware true
SetCompressor /SOLID {{compression}}

!include "MUI2.nsh"
!include "LogicLib.nsh"
!include "x64.nsh"

!define PRODUCT_NAME "{{product_name}}"
!define VERSION "{{version}}"
!define PUBLISHER "{{publisher}}"
!define BINARY_NAME "{{binary_name}}"
!define UNINSTALL_KEY "{{uninstall_key}}"

Name "${PRODUCT_NAME}"
OutFile "${OUTPUT_FILE}"
InstallDir "{{install_dir}}"
RequestExecutionLevel {{execution_level}}

VIProductVersion "{{version_nsis}}"
VIAddVersionKey "ProductName" "${PRODUCT_NAME}"
VIAddVersionKey "ProductVersion" "${VERSION}"
VIAddVersionKey "FileVersion" "${VERSION}"
VIAddVersionKey "CompanyName" "${PUBLISHER}"
VIAddVersionKey "LegalCopyright" "${PUBLISHER}"
VIAddVersionKey "FileDescription" "{{description}}"

{{#if installer_icon}}!define MUI_ICON "{{installer_icon}}"
{{/if}}
!insertmacro MUI_PAGE_WELCOME
!insertmacro MUI_PAGE_DIRECTORY
!insertmacro MUI_PAGE_INSTFILES
!define MUI_FINISHPAGE_RUN "{{main_binary}}"
!insertmacro MUI_PAGE_FINISH

!insertmacro MUI_UNPAGE_CONFIRM
!insertmacro MUI_UNPAGE_INSTFILES

!insertmacro MUI_LANGUAGE "English"

!macro SelectInstallContext
{{#if both}}  UserInfo::GetAccountType
  Pop $0
  ${If} $0 == "Admin"
    SetShellVarContext all
    StrCpy $INSTDIR "{{machine_dir}}"
  ${Else}
    SetShellVarContext current
    StrCpy $INSTDIR "{{user_dir}}"
  ${EndIf}
{{else}}  SetShellVarContext {{shell_context}}
{{/if}}!macroend

Function .onInit
{{#if is_64bit}}  ${IfNot} ${RunningX64}
    MessageBox MB_ICONSTOP "${PRODUCT_NAME} requires a 64-bit version of Windows."
    Abort
  ${EndIf}
{{/if}}  !insertmacro SelectInstallContext
FunctionEnd

Function un.onInit
  !insertmacro SelectInstallContext
FunctionEnd

Section "Install"
  SetOutPath "$INSTDIR"
{{#each binary_files}}  File "{{this}}"
{{/each}}
  WriteUninstaller "{{uninstaller}}"

  CreateDirectory "{{start_menu_dir}}"
  CreateShortcut "{{start_menu_shortcut}}" "{{main_binary}}"

  WriteRegStr SHCTX "${UNINSTALL_KEY}" "DisplayName" "${PRODUCT_NAME}"
  WriteRegStr SHCTX "${UNINSTALL_KEY}" "DisplayVersion" "${VERSION}"
  WriteRegStr SHCTX "${UNINSTALL_KEY}" "Publisher" "${PUBLISHER}"
  WriteRegStr SHCTX "${UNINSTALL_KEY}" "InstallLocation" "$INSTDIR"
  WriteRegStr SHCTX "${UNINSTALL_KEY}" "DisplayIcon" "{{main_binary}}"
  WriteRegStr SHCTX "${UNINSTALL_KEY}" "UninstallString" '"{{uninstaller}}"'
  WriteRegDWORD SHCTX "${UNINSTALL_KEY}" "NoModify" 1
  WriteRegDWORD SHCTX "${UNINSTALL_KEY}" "NoRepair" 1
{{#each url_schemes}}
  WriteRegStr SHCTX "{{this.key}}" "" "URL:{{this.scheme}} Protocol"
  WriteRegStr SHCTX "{{this.key}}" "URL Protocol" ""
  WriteRegStr SHCTX "{{this.command_key}}" "" '"{{../main_binary}}" "%1"'
{{/each}}SectionEnd

Section "Uninstall"
{{#each installed_files}}  Delete "{{this}}"
{{/each}}  Delete "{{uninstaller}}"
  RMDir "$INSTDIR"

  Delete "{{start_menu_shortcut}}"
  RMDir "{{start_menu_dir}}"

{{#each url_schemes}}  DeleteRegKey SHCTX "{{this.key}}"
{{/each}}  DeleteRegKey SHCTX "${UNINSTALL_KEY}"
SectionEnd
"#;
